//! `!`-prefixed console command parsing.

/// One parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reindex,
    ReindexFile(String),
    Status,
    Purge,
    ContextOn,
    ContextOff,
    ContextList,
    ContextNew(String),
    ContextSwitch(String),
    ContextDelete(String),
    Settings { key: String, value: String },
    Help,
    Quit,
}

/// Parse a `!command` line. The input must already start with `!`.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut parts = line.trim_start_matches('!').split_whitespace();
    let name = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    let arg1 = |usage: &str| -> Result<String, String> {
        match args.as_slice() {
            [value] => Ok((*value).to_string()),
            _ => Err(format!("usage: {usage}")),
        }
    };

    match name {
        "reindex" if args.is_empty() => Ok(Command::Reindex),
        "reindex-file" => Ok(Command::ReindexFile(arg1("!reindex-file <path>")?)),
        "status" => Ok(Command::Status),
        "purge" => Ok(Command::Purge),
        "context-on" => Ok(Command::ContextOn),
        "context-off" => Ok(Command::ContextOff),
        "context-list" => Ok(Command::ContextList),
        "context-new" => Ok(Command::ContextNew(arg1("!context-new <name>")?)),
        "context-switch" => Ok(Command::ContextSwitch(arg1("!context-switch <name>")?)),
        "context-delete" => Ok(Command::ContextDelete(arg1("!context-delete <name>")?)),
        "settings" => match args.as_slice() {
            [key, value] => Ok(Command::Settings {
                key: (*key).to_string(),
                value: (*value).to_string(),
            }),
            _ => Err("usage: !settings <param> <value>".to_string()),
        },
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '!{other}'; try !help")),
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  !reindex                  bring the index up to date with the source tree
  !reindex-file <path>      force one file through the indexing pipeline
  !status                   show indexed file and chunk counts
  !purge                    delete the index and all sessions (asks first)
  !context-on / off         toggle conversation history
  !context-list             list sessions
  !context-new <name>       create a session
  !context-switch <name>    switch the active session
  !context-delete <name>    delete a non-active session (asks first)
  !settings <param> <value> set a session override (e.g. temperature 0.2)
  !help                     this text
  !quit                     leave

Anything else is a question about the indexed codebase.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_commands() {
        assert_eq!(parse("!reindex"), Ok(Command::Reindex));
        assert_eq!(parse("!status"), Ok(Command::Status));
        assert_eq!(parse("!context-on"), Ok(Command::ContextOn));
        assert_eq!(parse("!quit"), Ok(Command::Quit));
        assert_eq!(parse("!exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parses_arguments() {
        assert_eq!(
            parse("!reindex-file src/main.rs"),
            Ok(Command::ReindexFile("src/main.rs".to_string()))
        );
        assert_eq!(
            parse("!context-switch work"),
            Ok(Command::ContextSwitch("work".to_string()))
        );
        assert_eq!(
            parse("!settings temperature 0.2"),
            Ok(Command::Settings {
                key: "temperature".to_string(),
                value: "0.2".to_string(),
            })
        );
    }

    #[test]
    fn test_rejects_missing_or_extra_arguments() {
        assert!(parse("!context-new").is_err());
        assert!(parse("!context-new a b").is_err());
        assert!(parse("!settings temperature").is_err());
        assert!(parse("!reindex now").is_err());
    }

    #[test]
    fn test_unknown_command_points_at_help() {
        let err = parse("!frobnicate").unwrap_err();
        assert!(err.contains("!help"));
    }
}
