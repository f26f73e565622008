//! Structured model of the generated scripts.
//!
//! Scripts are assembled from [`Line`]s and only turned into text by
//! [`Script::render`], which applies the quoting rules of the target
//! [`Dialect`]. Rendering is a pure function of the model, so generating the
//! same plan twice yields identical files.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// POSIX shell, `.sh`
    Shell,
    /// windows command interpreter, `.bat`
    Batch,
}

impl Dialect {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Shell => "sh",
            Self::Batch => "bat",
        }
    }

    /// quote a single word so it reaches the program unchanged
    pub fn quote(self, word: &str) -> Cow<'_, str> {
        match self {
            Self::Shell => {
                let safe = !word.is_empty()
                    && !word.starts_with('#')
                    && !word.starts_with('~')
                    && word.chars().all(|c| {
                        c.is_ascii_alphanumeric() || "_-./:=@%+,#".contains(c)
                    });

                if safe {
                    Cow::Borrowed(word)
                } else {
                    Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
                }
            }
            Self::Batch => {
                let escaped = word.replace('%', "%%");
                let safe = !escaped.is_empty()
                    && !escaped
                        .chars()
                        .any(|c| c.is_whitespace() || "&|<>^\"(),;=".contains(c));

                if safe {
                    Cow::Owned(escaped)
                } else {
                    Cow::Owned(format!("\"{}\"", escaped.replace('"', "\"\"")))
                }
            }
        }
    }

    /// words of an `echo` line are printed as they are, only the
    /// metacharacters are escaped
    fn echo_word(self, word: &str) -> Cow<'_, str> {
        match self {
            Self::Shell => self.quote(word),
            Self::Batch => {
                let mut escaped = String::with_capacity(word.len());
                for c in word.chars() {
                    match c {
                        '%' => escaped.push_str("%%"),
                        '&' | '|' | '<' | '>' | '^' => {
                            escaped.push('^');
                            escaped.push(c);
                        }
                        c => escaped.push(c),
                    }
                }
                Cow::Owned(escaped)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    StdinFrom(String),
    StdoutTo(String),
    StderrTo(String),
    StderrToStdout,
}

/// A single program call with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub redirects: Vec<Redirect>,
    pub background: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redirects: Vec::new(),
            background: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn redirect(mut self, redirect: Redirect) -> Self {
        self.redirects.push(redirect);
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    pub fn render(&self, dialect: Dialect) -> String {
        let mut line = String::new();

        if self.background && dialect == Dialect::Batch {
            line.push_str("start \"\" /b ");
        }

        line.push_str(&dialect.quote(&self.program));
        for arg in &self.args {
            line.push(' ');
            line.push_str(&dialect.quote(arg));
        }

        for redirect in &self.redirects {
            match redirect {
                Redirect::StdinFrom(path) => {
                    line.push_str(" < ");
                    line.push_str(&dialect.quote(path));
                }
                Redirect::StdoutTo(path) => {
                    line.push_str(" > ");
                    line.push_str(&dialect.quote(path));
                }
                Redirect::StderrTo(path) => {
                    line.push_str(" 2> ");
                    line.push_str(&dialect.quote(path));
                }
                Redirect::StderrToStdout => line.push_str(" 2>&1"),
            }
        }

        if self.background && dialect == Dialect::Shell {
            line.push_str(" &");
        }

        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Echo(String),
    Run(Invocation),
}

impl Line {
    pub fn render(&self, dialect: Dialect) -> String {
        match self {
            Self::Echo(text) => {
                let mut line = String::from("echo");
                for word in text.split(' ').filter(|word| !word.is_empty()) {
                    line.push(' ');
                    line.push_str(&dialect.echo_word(word));
                }
                line
            }
            Self::Run(invocation) => invocation.render(dialect),
        }
    }
}

impl From<Invocation> for Line {
    fn from(invocation: Invocation) -> Self {
        Self::Run(invocation)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    lines: Vec<Line>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echo(mut self, text: impl Into<String>) -> Self {
        self.lines.push(Line::Echo(text.into()));
        self
    }

    pub fn run(mut self, invocation: Invocation) -> Self {
        self.lines.push(Line::Run(invocation));
        self
    }

    pub fn push(&mut self, line: impl Into<Line>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// every line is terminated by a newline, an empty script renders empty
    pub fn render(&self, dialect: Dialect) -> String {
        self.lines
            .iter()
            .map(|line| line.render(dialect) + "\n")
            .collect()
    }
}

impl Extend<Line> for Script {
    fn extend<T: IntoIterator<Item = Line>>(&mut self, lines: T) {
        self.lines.extend(lines);
    }
}
