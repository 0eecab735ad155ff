//! Windows registry access through `reg.exe`.
//!
//! Going through the command seam keeps registry reads and writes visible in
//! logs and replaceable in tests.

use crate::exec::{CommandRunner, CommandSpec};

/// Per-user autostart key.
pub const RUN_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run";

/// A single value returned by `reg query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryValue {
    pub name: String,
    pub kind: String,
    pub data: String,
}

/// Parse `reg query <key> /v <name>` output and pick out `name`.
///
/// Lines look like `    PluginLoader    REG_SZ    "C:\path\to.exe"`; columns
/// are separated by four spaces and names may contain single spaces.
pub fn parse_query_output(stdout: &str, name: &str) -> Option<RegistryValue> {
    stdout.lines().find_map(|line| {
        let idx = line.find("    REG_")?;
        let value_name = line[..idx].trim();
        if !value_name.eq_ignore_ascii_case(name) {
            return None;
        }
        let rest = line[idx..].trim_start();
        let (kind, data) = match rest.split_once("    ") {
            Some((kind, data)) => (kind.trim(), data.trim()),
            None => (rest.trim(), ""),
        };
        Some(RegistryValue {
            name: value_name.to_string(),
            kind: kind.to_string(),
            data: data.to_string(),
        })
    })
}

/// Read one value. `Ok(None)` when the key or value does not exist.
pub async fn query_value(
    runner: &dyn CommandRunner,
    key: &str,
    name: &str,
) -> Result<Option<RegistryValue>, String> {
    let spec = CommandSpec::new("reg", ["query", key, "/v", name]);
    let output = runner
        .run(&spec)
        .await
        .map_err(|e| format!("cannot run reg.exe: {}", e))?;

    if !output.passed() {
        return Ok(None);
    }
    Ok(parse_query_output(&output.stdout, name))
}

/// Create or overwrite a `REG_SZ` value.
pub async fn set_string(
    runner: &dyn CommandRunner,
    key: &str,
    name: &str,
    data: &str,
) -> Result<(), String> {
    let spec = CommandSpec::new("reg", ["add", key, "/v", name, "/t", "REG_SZ", "/d", data, "/f"]);
    let output = runner
        .run(&spec)
        .await
        .map_err(|e| format!("cannot run reg.exe: {}", e))?;

    if output.passed() {
        Ok(())
    } else {
        Err(format!(
            "reg add exited with code {}: {}",
            output.exit_code,
            output.tail()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::fakes::ScriptedRunner;

    const QUERY_OUTPUT: &str = "\r\nHKEY_CURRENT_USER\\Software\\Microsoft\\Windows\\CurrentVersion\\Run\r\n    Plugin Loader    REG_SZ    \"C:\\Users\\deck\\homebrew\\services\\PluginLoader_noconsole.exe\"\r\n\r\n";

    #[test]
    fn test_parse_value_with_spaces_in_name() {
        let value = parse_query_output(QUERY_OUTPUT, "Plugin Loader").unwrap();
        assert_eq!(value.kind, "REG_SZ");
        assert_eq!(
            value.data,
            "\"C:\\Users\\deck\\homebrew\\services\\PluginLoader_noconsole.exe\""
        );
    }

    #[test]
    fn test_parse_other_name_is_none() {
        assert!(parse_query_output(QUERY_OUTPUT, "Discord").is_none());
    }

    #[tokio::test]
    async fn test_query_missing_value() {
        let runner = ScriptedRunner::new();
        runner.on(
            "reg query",
            CommandOutput::failed(1, "ERROR: The system was unable to find the specified registry key or value."),
        );
        let value = query_value(&runner, RUN_KEY, "PluginLoader").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_string_failure_reports_tail() {
        let runner = ScriptedRunner::new();
        runner.on("reg add", CommandOutput::failed(1, "ERROR: Access is denied."));
        let err = set_string(&runner, RUN_KEY, "PluginLoader", "x").await.unwrap_err();
        assert!(err.contains("Access is denied"));
    }
}
