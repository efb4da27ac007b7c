//! Platform-specific transport (Windows operator host)
//!
//! All `powershell.exe`/WinRM code is isolated here; the core engine only
//! sees the `Connector`/`ProfileSession` traits.

pub mod winrm;

pub use winrm::{PowerShellConnector, PowerShellPrerequisite, WindowsProfileSession};
