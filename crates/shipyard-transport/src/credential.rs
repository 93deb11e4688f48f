//! Git credential-helper protocol.
//!
//! The external transport registers this binary as the deployment
//! repository's credential helper. Git invokes it with an operation name and
//! a `key=value` request on stdin; for `get` it answers with the username and
//! token the transport put in the push process environment.

use std::io::{BufRead, Write};

/// Environment variable carrying the username to the helper.
pub const USERNAME_ENV: &str = "SHIPYARD_GIT_USERNAME";
/// Environment variable carrying the token to the helper.
pub const TOKEN_ENV: &str = "SHIPYARD_GIT_TOKEN";

/// Subcommand name the helper is reached through.
pub const HELPER_COMMAND: &str = "credential-helper";

/// Value for `credential.helper` invoking `exe` as the helper.
pub fn helper_config_value(exe: &std::path::Path) -> String {
    format!(
        "!\"{}\" {}",
        exe.display().to_string().replace('\\', "/"),
        HELPER_COMMAND
    )
}

/// Read a credential request until the blank line or end of input.
pub fn read_request(input: impl BufRead) -> std::io::Result<Vec<(String, String)>> {
    let mut fields = Vec::new();
    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.push((key.to_string(), value.to_string()));
        }
    }
    Ok(fields)
}

/// Answer one helper invocation.
///
/// Only `get` produces output, and only when a token is available. `store`
/// and `erase` are accepted and ignored since nothing is ever persisted.
pub fn respond(
    operation: &str,
    username: Option<&str>,
    token: Option<&str>,
    mut out: impl Write,
) -> std::io::Result<()> {
    if operation != "get" {
        return Ok(());
    }
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Ok(());
    };

    writeln!(out, "username={}", username.unwrap_or_default())?;
    writeln!(out, "password={}", token)?;
    Ok(())
}

/// Run the helper against the process's stdin, stdout and environment.
pub fn run(operation: &str) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    // Git waits for the request to be consumed before reading the answer.
    let _request = read_request(stdin.lock())?;

    let username = std::env::var(USERNAME_ENV).ok();
    let token = std::env::var(TOKEN_ENV).ok();
    let stdout = std::io::stdout();
    respond(operation, username.as_deref(), token.as_deref(), stdout.lock())
}
