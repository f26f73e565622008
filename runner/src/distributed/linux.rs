use super::{
    machine::{MachineDescriptor, ScriptStrategy},
    script::{Dialect, Invocation, Line, Redirect, Script},
    util::file_name_from_path,
    Deployment,
};
use std::{path::Path, process::Command};

#[derive(Debug, Clone, Copy, Default)]
pub struct Linux;

impl Linux {
    fn copy_to(&self, login: &str, dir: &str) -> String {
        format!("{login}:{dir}/.")
    }
}

impl ScriptStrategy for Linux {
    fn dialect(&self) -> Dialect {
        Dialect::Shell
    }

    fn separator(&self) -> char {
        '/'
    }

    fn start_script(&self, machine: &MachineDescriptor, deployment: &Deployment) -> Script {
        let run = machine
            .run_command(deployment)
            .into_invocation()
            .redirect(Redirect::StdinFrom("/dev/null".into()))
            .redirect(Redirect::StdoutTo("batch.log".into()))
            .redirect(Redirect::StderrToStdout)
            .background();

        Script::new()
            .echo(format!("Starting machine: {}", machine.login))
            .run(run)
    }

    fn send_script(&self, machine: &MachineDescriptor) -> Script {
        let mut script = Script::new();

        for file in machine.result_files() {
            script.push(
                Invocation::new("scp")
                    .arg(file_name_from_path(file))
                    .arg(format!("{}:{file}_{}", machine.host_login(), machine.name)),
            );
        }

        script
    }

    fn install_steps(
        &self,
        machine: &MachineDescriptor,
        deployment: &Deployment,
        machine_dir: &Path,
    ) -> Vec<Line> {
        let dir = &machine.install_dir;
        let target = self.copy_to(&machine.login, dir);

        vec![
            Line::Echo(format!("Installing at: {}", machine.name)),
            Invocation::new("ssh")
                .arg(&machine.login)
                .arg(format!("if [ ! -d {dir} ]; then mkdir {dir}; fi;"))
                .into(),
            Invocation::new("scp")
                .arg(deployment.package.display().to_string())
                .arg(&target)
                .into(),
            Invocation::new("scp")
                .arg(deployment.job.artifact().display().to_string())
                .arg(&target)
                .into(),
            Invocation::new("scp")
                .arg(machine_dir.join("start.sh").display().to_string())
                .arg(machine_dir.join("send.sh").display().to_string())
                .arg(&target)
                .into(),
            Invocation::new("ssh")
                .arg(&machine.login)
                .arg(format!("chmod 764 {dir}/*.sh"))
                .into(),
        ]
    }

    fn remote_start(&self, machine: &MachineDescriptor) -> Invocation {
        Invocation::new("ssh").arg(&machine.login).arg(format!(
            ". /etc/profile; cd {}; ./start.sh",
            machine.install_dir
        ))
    }

    fn launch_local(&self, start_script: &Path) -> Invocation {
        Invocation::new("bash")
            .arg(start_script.display().to_string())
            .background()
    }

    fn hook_command(&self, script: &Path) -> Command {
        let mut command = Command::new("bash");
        command.arg(script).env("LANG", "C");
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Settings, distributed::machine::MachineDescriptor};
    use arcbatch_jobs::JobSpec;
    use std::path::PathBuf;

    fn machine(yaml: &str) -> MachineDescriptor {
        let global = Settings {
            host: Some("coordinator".into()),
            output_file: Some("/results/out.txt".into()),
            pattern: Some(r".*\.arc".into()),
            ..Default::default()
        };
        MachineDescriptor::resolve(&serde_yaml::from_str(yaml).unwrap(), &global, None).unwrap()
    }

    fn deployment() -> Deployment {
        Deployment {
            package: PathBuf::from("/opt/dist/arcbatch"),
            job: JobSpec::Standalone {
                path: PathBuf::from("/opt/jobs/mimesize"),
            },
        }
    }

    const NODE: &str =
        "name: node1\nmachine-user-name: batch\ninstall-dir: /home/batch/run\ndirectories: [/srv/a, /srv/b]\n";

    #[test]
    fn start_script() {
        let script = Linux.start_script(&machine(NODE), &deployment());

        assert_eq!(
            script.render(Dialect::Shell),
            "echo Starting machine: batch@node1\n\
             /home/batch/run/arcbatch run -C/home/batch/run/mimesize -D/srv/a#/srv/b \
             -B/home/batch/run/send.sh -Oout.txt '-P.*\\.arc' < /dev/null > batch.log 2>&1 &\n"
        );
    }

    #[test]
    fn send_script() {
        let script = Linux.send_script(&machine(NODE));

        assert_eq!(
            script.render(Dialect::Shell),
            "scp out.txt coordinator:/results/out.txt_node1\n"
        );
    }

    #[test]
    fn install_steps() {
        let lines = Linux.install_steps(
            &machine(NODE),
            &deployment(),
            Path::new("/plan/scripts/node1"),
        );
        let rendered = lines
            .iter()
            .map(|line| line.render(Dialect::Shell))
            .collect::<Vec<_>>();

        assert_eq!(
            rendered,
            [
                "echo Installing at: node1",
                "ssh batch@node1 'if [ ! -d /home/batch/run ]; then mkdir /home/batch/run; fi;'",
                "scp /opt/dist/arcbatch batch@node1:/home/batch/run/.",
                "scp /opt/jobs/mimesize batch@node1:/home/batch/run/.",
                "scp /plan/scripts/node1/start.sh /plan/scripts/node1/send.sh batch@node1:/home/batch/run/.",
                "ssh batch@node1 'chmod 764 /home/batch/run/*.sh'",
            ]
        );
    }

    #[test]
    fn remote_start() {
        assert_eq!(
            Linux.remote_start(&machine(NODE)).render(Dialect::Shell),
            "ssh batch@node1 '. /etc/profile; cd /home/batch/run; ./start.sh'"
        );
    }
}
