use std::{borrow::Cow, str::FromStr};

use jobpack_model::Task;

/// How a task is rendered into the single command line handed to a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandEncoding {
    /// Arguments joined by single spaces; the result is re-parsed by the backend's shell.
    ///
    /// This is what a `make` recipe forwarded as `SHELL -c <recipe>` expects, but it does not
    /// preserve argument boundaries.
    #[default]
    Joined,
    /// Every argument shell-quoted and the command prefixed with `cd <cwd> &&` when a cwd is known.
    ///
    /// Arguments holding control characters use bash ANSI-C quoting (`$'a\nb'`), so the rendered
    /// command always stays on one line.
    Quoted,
}

impl CommandEncoding {
    pub fn render(self, task: &Task) -> String {
        match self {
            CommandEncoding::Joined => task.joined(),
            CommandEncoding::Quoted => {
                let cmd = task
                    .argv
                    .iter()
                    .map(|arg| quote(arg))
                    .collect::<Vec<_>>()
                    .join(" ");
                let cwd = task.cwd.to_string_lossy();
                if cwd.is_empty() {
                    cmd
                } else {
                    format!("cd {} && {}", quote(&cwd), cmd)
                }
            }
        }
    }

    /// Whether `task` renders to a single line.
    ///
    /// The backends read one command per line, so a `Joined` task with a line break in any
    /// argument would run as several commands.
    pub fn fits_one_line(self, task: &Task) -> bool {
        match self {
            CommandEncoding::Joined => !task.argv.iter().any(|arg| arg.contains(['\n', '\r'])),
            CommandEncoding::Quoted => true,
        }
    }
}

impl FromStr for CommandEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "joined" => Ok(CommandEncoding::Joined),
            "quoted" => Ok(CommandEncoding::Quoted),
            other => Err(format!("unknown command encoding: {other} (expected: joined|quoted)")),
        }
    }
}

/// POSIX single-quote `arg` unless it only holds characters no shell treats specially.
fn quote(arg: &str) -> Cow<'_, str> {
    if arg.chars().any(|c| c.is_ascii_control()) {
        return Cow::Owned(ansi_c_quote(arg));
    }
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

fn ansi_c_quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 3);
    out.push_str("$'");
    for c in arg.chars() {
        match c {
            '\n' => out.push_str(r"\n"),
            '\r' => out.push_str(r"\r"),
            '\t' => out.push_str(r"\t"),
            '\\' => out.push_str(r"\\"),
            '\'' => out.push_str(r"\'"),
            c if c.is_ascii_control() => out.push_str(&format!(r"\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
