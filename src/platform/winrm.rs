//! PowerShell/WinRM transport for real Windows hosts
//!
//! Implements the `Connector`/`ProfileSession` traits by shelling out to
//! `powershell.exe` on the operator host. Secrets and scripts travel over
//! stdin as a JSON payload so the password never appears in process
//! arguments, and scripts are base64-encoded to survive quoting.
//!
//! # Session lifecycle
//!
//! Each remote execution creates an **explicit** `PSSession` via
//! `New-PSSession`, runs the script with `Invoke-Command -Session`, and
//! tears it down with `Remove-PSSession` inside a `finally` block. This
//! frees the remote `wsmprovhost.exe` process immediately instead of
//! leaving it to the WinRM idle timeout. Local targets execute directly
//! without a PSSession.

use crate::constants::{
    CREATE_NO_WINDOW, PING_TIMEOUT_MS, PROFILE_DELETE_TIMEOUT_SECS, PROFILE_QUERY_TIMEOUT_SECS,
    SESSION_VALIDATION_TIMEOUT_SECS, TCP_PROBE_TIMEOUT_MS, WINRM_TCP_PORTS,
};
use crate::core::orchestrator::PrerequisiteCheck;
use crate::core::session::{
    sort_most_recent_first, Connector, ProfileRecord, ProfileSession, Reachability, Target,
};
use crate::models::Credentials;
use crate::utils::{
    is_transient_error, retry_with_backoff, PreconditionError, RegistryError, RetryConfig,
    SessionError,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::os::windows::process::CommandExt;
use std::process::Command;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Stdin payload handed to every bootstrap script
///
/// SECURITY: this is the only channel the password travels through.
#[derive(Serialize)]
struct ScriptPayload {
    server: String,
    username: String,
    password: String,
    command_b64: String,
}

/// Wraps a script in an explicit PSSession against `$payload.server`.
/// Credentials are optional; an empty username falls back to the implicit
/// identity of the operator process (domain SSO).
const REMOTE_BOOTSTRAP: &str = r#"$ErrorActionPreference = 'Stop'
$session = $null
try {
    $raw = [Console]::In.ReadToEnd()
    if ([string]::IsNullOrWhiteSpace($raw)) { throw 'No input provided' }
    $payload = $raw | ConvertFrom-Json

    $server = [string]$payload.server
    $username = [string]$payload.username
    $pwPlain = [string]$payload.password
    $commandBytes = [System.Convert]::FromBase64String([string]$payload.command_b64)
    $commandText = [System.Text.Encoding]::UTF8.GetString($commandBytes)

    if ($username) {
        $pwSecure = New-Object System.Security.SecureString
        $pwPlain.ToCharArray() | ForEach-Object { $pwSecure.AppendChar($_) }
        $cred = New-Object System.Management.Automation.PSCredential($username, $pwSecure)
        $session = New-PSSession -ComputerName $server -Credential $cred -ErrorAction Stop
    } else {
        $session = New-PSSession -ComputerName $server -ErrorAction Stop
    }

    Invoke-Command -Session $session -ErrorAction Stop -ScriptBlock {
        param($scriptText)
        $sb = [ScriptBlock]::Create($scriptText)
        & $sb
    } -ArgumentList $commandText
} catch {
    Write-Error $_.Exception.Message
    exit 1
} finally {
    if ($session) {
        Remove-PSSession -Session $session -ErrorAction SilentlyContinue
    }
}"#;

/// Runs the decoded script directly on the operator host.
const LOCAL_BOOTSTRAP: &str = r#"$ErrorActionPreference = 'Stop'
try {
    $raw = [Console]::In.ReadToEnd()
    if ([string]::IsNullOrWhiteSpace($raw)) { throw 'No input provided' }
    $payload = $raw | ConvertFrom-Json
    $commandBytes = [System.Convert]::FromBase64String([string]$payload.command_b64)
    $commandText = [System.Text.Encoding]::UTF8.GetString($commandBytes)
    $sb = [ScriptBlock]::Create($commandText)
    & $sb
} catch {
    Write-Error $_.Exception.Message
    exit 1
}"#;

/// `Test-WSMan` with the provided credentials, so authentication failures
/// surface at open time instead of on the first registry call.
const VALIDATE_BOOTSTRAP: &str = r#"$ErrorActionPreference = 'Stop'
try {
    $raw = [Console]::In.ReadToEnd()
    if ([string]::IsNullOrWhiteSpace($raw)) { throw 'No payload received' }
    $payload = $raw | ConvertFrom-Json

    $server = [string]$payload.server
    $username = [string]$payload.username
    $pwPlain = [string]$payload.password

    if ($username) {
        $pwSecure = New-Object System.Security.SecureString
        $pwPlain.ToCharArray() | ForEach-Object { $pwSecure.AppendChar($_) }
        $cred = New-Object System.Management.Automation.PSCredential($username, $pwSecure)
        Test-WSMan -ComputerName $server -Credential $cred -Authentication Default -ErrorAction Stop | Out-Null
    } else {
        Test-WSMan -ComputerName $server -ErrorAction Stop | Out-Null
    }
} catch {
    Write-Error $_.Exception.Message
    exit 1
}"#;

/// Projects every non-special profile to one JSON row. `@(...)` forces an
/// array even for a single row.
const LIST_PROFILES_SCRIPT: &str = r#"$ErrorActionPreference = 'Stop'
try {
    $rows = Get-CimInstance -ClassName Win32_UserProfile -ErrorAction Stop |
        Where-Object { -not $_.Special } |
        ForEach-Object {
            $lastUse = $null
            if ($_.LastUseTime) {
                $lastUse = $_.LastUseTime.ToUniversalTime().ToString('yyyy-MM-ddTHH:mm:ssZ')
            }
            [pscustomobject]@{
                local_path = $_.LocalPath
                sid = $_.SID
                loaded = [bool]$_.Loaded
                special = [bool]$_.Special
                last_use_time = $lastUse
            }
        }
    ConvertTo-Json -InputObject @($rows) -Compress
} catch {
    Write-Error "Failed to enumerate profiles: $_"
    exit 1
}"#;

/// One row of the enumeration script's JSON output
#[derive(Debug, Deserialize)]
struct RawProfileRow {
    local_path: String,
    sid: Option<String>,
    loaded: bool,
    special: bool,
    last_use_time: Option<String>,
}

/// Spawn `powershell.exe` with the given bootstrap, feed the payload over
/// stdin, and wait for completion within `limit`.
///
/// The child cannot be killed once `spawn_blocking` has started it; an
/// elapsed timeout abandons the wait and reports the task as timed out.
async fn run_powershell(
    bootstrap: &'static str,
    payload_json: String,
    limit: Duration,
) -> Result<std::process::Output, SessionError> {
    let handle = tokio::task::spawn_blocking(move || {
        use std::io::Write;

        let mut cmd = Command::new("powershell.exe");
        cmd.arg("-NoProfile")
            .arg("-NonInteractive")
            .arg("-Command")
            .arg(bootstrap)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn()?;
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| std::io::Error::other("Failed to open stdin"))?;
            stdin.write_all(payload_json.as_bytes())?;
        }

        child.wait_with_output()
    });

    timeout(limit, handle)
        .await
        .map_err(|_| SessionError::Timeout(limit))?
        .map_err(|e| SessionError::CommandFailed(format!("PowerShell task failed: {}", e)))?
        .map_err(|e| SessionError::CommandFailed(format!("Failed to run powershell.exe: {}", e)))
}

/// Extract, redact and simplify the failure text of a non-zero exit.
fn failure_message(output: &std::process::Output, secret: Option<&str>) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let raw = if !stderr.trim().is_empty() {
        stderr.to_string()
    } else if !stdout.trim().is_empty() {
        stdout.to_string()
    } else {
        "Unknown error".to_string()
    };

    let redacted = match secret {
        Some(password) if !password.is_empty() => raw.replace(password, "<redacted>"),
        _ => raw,
    };
    simplify_error_message(&redacted)
}

/// Simplify common WinRM failure texts into something an operator can act on.
fn simplify_error_message(raw_error: &str) -> String {
    let lower = raw_error.to_lowercase();

    if lower.contains("trustedhosts") || lower.contains("authentication scheme") {
        return "WinRM authentication failed. The target server must be in TrustedHosts."
            .to_string();
    }
    if lower.contains("access is denied") || lower.contains("access denied") {
        return "Access denied. Check username and password are correct.".to_string();
    }
    if lower.contains("cannot find the computer") || lower.contains("cannot be resolved") {
        return "Server not found. Check the hostname is correct and reachable.".to_string();
    }
    if lower.contains("winrm cannot complete the operation") {
        return "WinRM service not responding. Ensure WinRM is enabled on the target server."
            .to_string();
    }
    if lower.contains("connection refused") || lower.contains("actively refused") {
        return "Connection refused. WinRM may not be enabled on the target server.".to_string();
    }
    if lower.contains("network path was not found") {
        return "Network path not found. Check network connectivity to server.".to_string();
    }
    if lower.contains("the user name or password is incorrect") {
        return "Invalid credentials. Check username and password.".to_string();
    }

    let snippet = raw_error.trim();
    if snippet.is_empty() {
        return "Remote command failed".to_string();
    }
    let max_len = 800;
    if snippet.len() > max_len {
        let cut: String = snippet.chars().take(max_len).collect();
        format!("{}...", cut)
    } else {
        snippet.to_string()
    }
}

/// Production [`Connector`]: ICMP/TCP reachability probe plus WinRM session
/// establishment
pub struct PowerShellConnector {
    credentials: Option<Credentials>,
}

impl PowerShellConnector {
    /// `credentials: None` uses the operator process identity (domain SSO).
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self { credentials }
    }

    fn payload_json(&self, target: &Target, command: &str) -> Result<String, SessionError> {
        let payload = ScriptPayload {
            server: target.as_str().to_string(),
            username: self
                .credentials
                .as_ref()
                .map(|c| c.username().as_str().to_string())
                .unwrap_or_default(),
            password: self
                .credentials
                .as_ref()
                .map(|c| c.password().as_str().to_string())
                .unwrap_or_default(),
            command_b64: general_purpose::STANDARD.encode(command.as_bytes()),
        };
        serde_json::to_string(&payload)
            .map_err(|e| SessionError::CommandFailed(format!("Failed to serialize payload: {}", e)))
    }

    fn password(&self) -> Option<String> {
        self.credentials
            .as_ref()
            .map(|c| c.password().as_str().to_string())
    }
}

/// Lightweight ICMP check via `ping.exe`. A non-zero exit means no echo
/// reply, which is an outcome, not an error.
async fn ping_host(host: &str) -> Result<bool, String> {
    let host = host.to_string();
    let output = tokio::task::spawn_blocking(move || {
        let mut cmd = Command::new("ping");
        cmd.arg("-n")
            .arg("1")
            .arg("-w")
            .arg(PING_TIMEOUT_MS.to_string())
            .arg(host);
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd.output()
    })
    .await
    .map_err(|e| format!("Failed to spawn ping: {}", e))?
    .map_err(|e| format!("Ping execution failed: {}", e))?;

    Ok(output.status.success())
}

/// TCP connect attempts against the WinRM ports, in parallel. Any port
/// answering means a management session is possible even when a perimeter
/// firewall drops echo requests.
async fn any_winrm_port_open(host: &str) -> bool {
    let attempts: Vec<_> = WINRM_TCP_PORTS
        .iter()
        .copied()
        .map(|port| {
            let addr = format!("{}:{}", host, port);
            async move {
                matches!(
                    timeout(
                        Duration::from_millis(TCP_PROBE_TIMEOUT_MS),
                        TcpStream::connect(&addr),
                    )
                    .await,
                    Ok(Ok(_))
                )
            }
        })
        .collect();

    join_all(attempts).await.into_iter().any(|open| open)
}

#[async_trait::async_trait]
impl Connector for PowerShellConnector {
    async fn probe(&self, target: &Target) -> Reachability {
        let host = match target {
            Target::Local => return Reachability::Reachable,
            Target::Remote(name) => name.clone(),
        };

        let ping_ok = retry_with_backoff(
            RetryConfig::probe(),
            || ping_host(&host),
            |err: &String| is_transient_error(err),
        )
        .await
        .unwrap_or(false);
        if ping_ok {
            return Reachability::Reachable;
        }

        if any_winrm_port_open(&host).await {
            tracing::debug!(target = %host, "ICMP filtered, WinRM port answered");
            return Reachability::Reachable;
        }

        Reachability::Unreachable(format!(
            "no ping reply and no WinRM port ({:?}) answering",
            WINRM_TCP_PORTS
        ))
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn ProfileSession>, SessionError> {
        if !target.is_local() {
            let payload = self.payload_json(target, "")?;
            let output = run_powershell(
                VALIDATE_BOOTSTRAP,
                payload,
                Duration::from_secs(SESSION_VALIDATION_TIMEOUT_SECS),
            )
            .await?;
            if !output.status.success() {
                let message = failure_message(&output, self.password().as_deref());
                return Err(SessionError::WinRm(message));
            }
        }

        Ok(Box::new(WindowsProfileSession {
            target: target.clone(),
            credentials: self.credentials.clone(),
        }))
    }
}

/// One validated target, local or remote
///
/// Holds no live transport. Each registry call builds its own PSSession and
/// releases it in the bootstrap's `finally`, so dropping this struct leaks
/// nothing on the remote host.
pub struct WindowsProfileSession {
    target: Target,
    credentials: Option<Credentials>,
}

impl WindowsProfileSession {
    async fn execute(&self, script: &str, limit: Duration) -> Result<String, SessionError> {
        let payload = ScriptPayload {
            server: self.target.as_str().to_string(),
            username: self
                .credentials
                .as_ref()
                .map(|c| c.username().as_str().to_string())
                .unwrap_or_default(),
            password: self
                .credentials
                .as_ref()
                .map(|c| c.password().as_str().to_string())
                .unwrap_or_default(),
            command_b64: general_purpose::STANDARD.encode(script.as_bytes()),
        };
        let payload_json = serde_json::to_string(&payload).map_err(|e| {
            SessionError::CommandFailed(format!("Failed to serialize payload: {}", e))
        })?;

        let bootstrap = if self.target.is_local() {
            LOCAL_BOOTSTRAP
        } else {
            REMOTE_BOOTSTRAP
        };
        let output = run_powershell(bootstrap, payload_json, limit).await?;

        if !output.status.success() {
            let secret = self
                .credentials
                .as_ref()
                .map(|c| c.password().as_str().to_string());
            let message = failure_message(&output, secret.as_deref());
            tracing::warn!(target = %self.target, error = %message, "PowerShell execution failed");
            return Err(SessionError::WinRm(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait::async_trait]
impl ProfileSession for WindowsProfileSession {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileRecord>, RegistryError> {
        let raw = self
            .execute(
                LIST_PROFILES_SCRIPT,
                Duration::from_secs(PROFILE_QUERY_TIMEOUT_SECS),
            )
            .await
            .map_err(|e| RegistryError::Query(e.to_string()))?;

        let mut profiles = parse_profile_rows(&raw, &self.target)?;
        sort_most_recent_first(&mut profiles);
        Ok(profiles)
    }

    async fn delete_profile(&self, record: &ProfileRecord) -> Result<(), RegistryError> {
        let script = delete_script(record)?;
        self.execute(&script, Duration::from_secs(PROFILE_DELETE_TIMEOUT_SECS))
            .await
            .map_err(|e| RegistryError::Delete(e.to_string()))?;
        Ok(())
    }
}

/// Parse the enumeration script's JSON into records. Tolerates a single
/// bare object (older PowerShell unwraps one-element arrays) and keeps a
/// row whose timestamp fails to parse rather than failing the listing.
fn parse_profile_rows(raw: &str, target: &Target) -> Result<Vec<ProfileRecord>, RegistryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<RawProfileRow> = match serde_json::from_str(trimmed) {
        Ok(rows) => rows,
        Err(_) => {
            let single: RawProfileRow = serde_json::from_str(trimmed).map_err(|e| {
                RegistryError::Parse(format!(
                    "profile JSON: {} (first 200 chars: {})",
                    e,
                    trimmed.chars().take(200).collect::<String>()
                ))
            })?;
            vec![single]
        }
    };

    Ok(rows
        .into_iter()
        .filter(|row| !row.special)
        .map(|row| {
            let last_use_time = row.last_use_time.as_deref().and_then(|text| {
                match DateTime::parse_from_rfc3339(text) {
                    Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                    Err(err) => {
                        tracing::warn!(target = %target, raw = text, error = %err, "unparseable last-use timestamp");
                        None
                    }
                }
            });
            ProfileRecord {
                target: target.clone(),
                user_name: ProfileRecord::user_name_from_path(&row.local_path),
                local_path: row.local_path,
                last_use_time,
                loaded: row.loaded,
                special: row.special,
                sid: row.sid,
            }
        })
        .collect())
}

/// Build the removal script, addressing the profile by SID when present and
/// by LocalPath otherwise. Values are validated before embedding; the
/// loaded re-check guards against a login racing the sweep.
fn delete_script(record: &ProfileRecord) -> Result<String, RegistryError> {
    let filter = match &record.sid {
        Some(sid) => {
            if sid.is_empty() || !sid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(RegistryError::Parse(format!("malformed SID: {:?}", sid)));
            }
            format!("SID = '{}'", sid)
        }
        None => {
            if record.local_path.contains('\'') {
                return Err(RegistryError::Parse(format!(
                    "unsupported character in profile path: {}",
                    record.local_path
                )));
            }
            format!("LocalPath = '{}'", record.local_path.replace('\\', "\\\\"))
        }
    };

    Ok(format!(
        r#"$ErrorActionPreference = 'Stop'
try {{
    $userProfile = Get-CimInstance -ClassName Win32_UserProfile -Filter "{filter}" -ErrorAction Stop
    if (-not $userProfile) {{ Write-Error 'Profile no longer exists'; exit 1 }}
    if ($userProfile.Loaded) {{ Write-Error 'The profile is in use'; exit 1 }}
    Remove-CimInstance -InputObject $userProfile -ErrorAction Stop
}} catch {{
    Write-Error "Failed to remove profile: $_"
    exit 1
}}"#
    ))
}

/// Confirms `powershell.exe` is invocable on the operator host before any
/// orchestration begins
pub struct PowerShellPrerequisite;

impl PrerequisiteCheck for PowerShellPrerequisite {
    fn verify(&self) -> Result<(), PreconditionError> {
        let mut cmd = Command::new("powershell.exe");
        cmd.arg("-NoProfile")
            .arg("-NonInteractive")
            .arg("-Command")
            .arg("$PSVersionTable.PSVersion.Major");
        cmd.creation_flags(CREATE_NO_WINDOW);

        let output = cmd.output().map_err(|e| {
            PreconditionError::Unavailable(format!("powershell.exe not invocable: {}", e))
        })?;
        if !output.status.success() {
            return Err(PreconditionError::Unavailable(
                "powershell.exe exited with failure".to_string(),
            ));
        }

        let major: u32 = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .unwrap_or(0);
        if major < 3 {
            return Err(PreconditionError::Unavailable(format!(
                "PowerShell 3.0 or newer required (found major version {})",
                major
            )));
        }
        Ok(())
    }
}
