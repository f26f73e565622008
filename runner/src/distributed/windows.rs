use super::{
    machine::{MachineDescriptor, ScriptStrategy},
    script::{Dialect, Invocation, Line, Redirect, Script},
    util::file_name_from_path,
    Deployment,
};
use std::{path::Path, process::Command};

/// scp as installed by cygwin
const CYGWIN_SCP: &str = r"C:\cygwin\bin\scp.exe";

#[derive(Debug, Clone, Copy, Default)]
pub struct Windows;

impl ScriptStrategy for Windows {
    fn dialect(&self) -> Dialect {
        Dialect::Batch
    }

    fn separator(&self) -> char {
        '\\'
    }

    fn start_script(&self, machine: &MachineDescriptor, deployment: &Deployment) -> Script {
        let run = machine
            .run_command(deployment)
            .into_invocation()
            .redirect(Redirect::StderrTo("batch.log".into()));

        Script::new()
            .echo(format!("Starting machine: {}", machine.login))
            .run(run)
    }

    fn send_script(&self, machine: &MachineDescriptor) -> Script {
        let mut script = Script::new();

        for file in machine.result_files() {
            script.push(
                Invocation::new(CYGWIN_SCP)
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
        let target = format!("{}:{dir}", machine.login);

        vec![
            Line::Echo(format!("Installing at: {}", machine.name)),
            Invocation::new("ssh")
                .arg(&machine.login)
                .arg(format!("if not exist {dir} mkdir {dir}"))
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
                .arg(machine_dir.join("start.bat").display().to_string())
                .arg(machine_dir.join("send.bat").display().to_string())
                .arg(&target)
                .into(),
            // batch files are runnable as they are
            Line::Echo(format!("No permissions to change at: {}", machine.name)),
        ]
    }

    fn remote_start(&self, machine: &MachineDescriptor) -> Invocation {
        Invocation::new("ssh").arg(&machine.login).arg(format!(
            "cmd /c cd /d {} && start.bat",
            machine.install_dir
        ))
    }

    fn launch_local(&self, start_script: &Path) -> Invocation {
        Invocation::new("cmd")
            .arg("/r")
            .arg(start_script.display().to_string())
            .background()
    }

    fn hook_command(&self, script: &Path) -> Command {
        let mut command = Command::new("cmd");
        command.arg("/c").arg(script).env("LANG", "C");
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Settings, distributed::machine::MachineDescriptor};
    use arcbatch_jobs::JobSpec;
    use std::path::PathBuf;

    fn machine() -> MachineDescriptor {
        let global = Settings {
            host: Some("coordinator".into()),
            host_username: Some("batch".into()),
            output_file: Some("/results/out.txt".into()),
            error_file: Some("/results/err.txt".into()),
            subdir: Some(true),
            ..Default::default()
        };
        let config = serde_yaml::from_str(
            "name: winbox\nos: windows\ninstall-dir: 'C:\\batch'\ndirectories: ['D:\\arcs', 'E:\\more']\n",
        )
        .unwrap();
        MachineDescriptor::resolve(&config, &global, None).unwrap()
    }

    fn deployment() -> Deployment {
        Deployment {
            package: PathBuf::from("/opt/dist/arcbatch.exe"),
            job: JobSpec::Packaged {
                archive: PathBuf::from("/opt/jobs/jobs.pkg"),
                entry: "dedup".into(),
            },
        }
    }

    #[test]
    fn start_script() {
        let script = Windows.start_script(&machine(), &deployment());

        assert_eq!(
            script.render(Dialect::Batch),
            "echo Starting machine: winbox\n\
             C:\\batch\\arcbatch.exe run -JC:\\batch\\jobs.pkg -Ndedup -DD:\\arcs#E:\\more \
             -BC:\\batch\\send.bat -Oout.txt -Eerr.txt -R 2> batch.log\n"
        );
    }

    #[test]
    fn send_script_uses_cygwin_scp() {
        let script = Windows.send_script(&machine());

        assert_eq!(
            script.render(Dialect::Batch),
            "C:\\cygwin\\bin\\scp.exe out.txt batch@coordinator:/results/out.txt_winbox\n\
             C:\\cygwin\\bin\\scp.exe err.txt batch@coordinator:/results/err.txt_winbox\n"
        );
    }

    #[test]
    fn install_does_not_change_permissions() {
        let lines = Windows.install_steps(&machine(), &deployment(), Path::new("/plan/winbox"));

        assert_eq!(
            lines[1].render(Dialect::Shell),
            r"ssh winbox 'if not exist C:\batch mkdir C:\batch'"
        );
        assert_eq!(
            lines.last().unwrap().render(Dialect::Shell),
            "echo No permissions to change at: winbox"
        );
        assert!(lines
            .iter()
            .all(|line| !line.render(Dialect::Shell).contains("chmod")));
    }

    #[test]
    fn remote_start() {
        assert_eq!(
            Windows.remote_start(&machine()).render(Dialect::Shell),
            r"ssh winbox 'cmd /c cd /d C:\batch && start.bat'"
        );
    }
}
