//! `compile_commands.json` synthesis.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::model::CommandInfo;

/// File name of the export, at the project root.
pub const COMPILE_COMMANDS_FILE: &str = "compile_commands.json";

/// One entry of the compilation database, in the format clang tooling reads.
#[derive(Debug, Serialize)]
struct CompileCommand<'a> {
    directory: &'a str,
    command: String,
    file: &'a str,
}

/// Write the compilation database for the given commands, one entry per
/// recorded source file.
pub fn write_compile_commands(commands: &[CommandInfo], project_root: &Path) -> Result<()> {
    let entries: Vec<CompileCommand<'_>> = commands
        .iter()
        .map(|ci| CompileCommand {
            directory: &ci.working_dir,
            command: ci.command_line(),
            file: &ci.file,
        })
        .collect();

    let path = project_root.join(COMPILE_COMMANDS_FILE);
    let json = serde_json::to_string_pretty(&entries)
        .map_err(|e| crate::error::Error::Internal(format!("export serialization failed: {e}")))?;
    std::fs::write(&path, json)?;

    info!(entries = entries.len(), path = %path.display(), "compilation database written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_contains_one_entry_per_command() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let commands = vec![
            CommandInfo {
                file: "src/a.cpp".to_string(),
                working_dir: "/proj".to_string(),
                command: "clang++".to_string(),
                args: vec!["-c".to_string(), "src/a.cpp".to_string()],
                last_indexed: 1,
            },
            CommandInfo {
                file: "src/b.cpp".to_string(),
                working_dir: "/proj".to_string(),
                command: "clang++".to_string(),
                args: vec!["-c".to_string(), "src/b.cpp".to_string()],
                last_indexed: 2,
            },
        ];

        write_compile_commands(&commands, dir.path()).expect("export");

        let raw = std::fs::read_to_string(dir.path().join(COMPILE_COMMANDS_FILE)).expect("read");
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        let entries = parsed.as_array().expect("array");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["directory"], "/proj");
        assert_eq!(entries[0]["command"], "clang++ -c src/a.cpp");
        assert_eq!(entries[0]["file"], "src/a.cpp");
    }

    #[test]
    fn empty_store_exports_an_empty_array() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        write_compile_commands(&[], dir.path()).expect("export");

        let raw = std::fs::read_to_string(dir.path().join(COMPILE_COMMANDS_FILE)).expect("read");
        assert_eq!(raw.trim(), "[]");
    }
}
