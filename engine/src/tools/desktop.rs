//! Platform side effects behind the named tools.
//!
//! macOS uses `screencapture`, `osascript`, Quartz via `python3`, and `open`.
//! Linux uses `scrot`, `xdotool`, and the desktop's default URL handler.
//! Every helper process is bounded by [`HELPER_TIMEOUT`].

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub const HELPER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Click,
    Move,
}

impl PointerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointerAction::Click => "click",
            PointerAction::Move => "move",
        }
    }
}

/// The machine the agent drives.
#[async_trait]
pub trait Desktop: Send + Sync {
    /// Capture the whole display into a PNG at `path`
    async fn capture_screen(&self, path: &Path) -> Result<()>;

    async fn pointer(&self, x: f64, y: f64, action: PointerAction) -> Result<()>;

    /// Synthesize keystrokes for `text` into the focused window
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Open a URL in the default handler
    async fn open_url(&self, url: &str) -> Result<()>;

    /// Launch an application by name
    async fn open_app(&self, app: &str) -> Result<()>;
}

/// [`Desktop`] backed by the host's command-line utilities.
#[derive(Debug, Clone, Default)]
pub struct SystemDesktop;

impl SystemDesktop {
    pub fn new() -> Self {
        Self
    }
}

/// Run a helper to completion, failing on spawn error, timeout or non-zero exit.
async fn run_helper(program: &str, args: &[&str]) -> Result<()> {
    debug!(program, ?args, "Running desktop helper");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(HELPER_TIMEOUT, child)
        .await
        .map_err(|_| anyhow!("{} timed out after {}s", program, HELPER_TIMEOUT.as_secs()))?
        .with_context(|| format!("{}: failed to start", program))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        bail!("{} exited with {}", program, output.status);
    }
    bail!("{}: {}", program, stderr)
}

fn quartz_script(x: f64, y: f64, action: PointerAction) -> String {
    let mut lines = vec![
        "import Quartz".to_string(),
        format!("point = Quartz.CGPoint({}, {})", x, y),
        "move = Quartz.CGEventCreateMouseEvent(None, Quartz.kCGEventMouseMoved, point, Quartz.kCGMouseButtonLeft)".to_string(),
        "Quartz.CGEventPost(Quartz.kCGHIDEventTap, move)".to_string(),
    ];
    if action == PointerAction::Click {
        lines.push("down = Quartz.CGEventCreateMouseEvent(None, Quartz.kCGEventLeftMouseDown, point, Quartz.kCGMouseButtonLeft)".to_string());
        lines.push("Quartz.CGEventPost(Quartz.kCGHIDEventTap, down)".to_string());
        lines.push("up = Quartz.CGEventCreateMouseEvent(None, Quartz.kCGEventLeftMouseUp, point, Quartz.kCGMouseButtonLeft)".to_string());
        lines.push("Quartz.CGEventPost(Quartz.kCGHIDEventTap, up)".to_string());
    }
    lines.join("; ")
}

/// Quote `text` as an AppleScript string literal.
fn applescript_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

const MACOS: bool = cfg!(target_os = "macos");
const LINUX: bool = cfg!(target_os = "linux");

#[async_trait]
impl Desktop for SystemDesktop {
    async fn capture_screen(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy().into_owned();

        if MACOS {
            run_helper("screencapture", &["-x", path.as_str()]).await
        } else if LINUX {
            run_helper("scrot", &["--overwrite", path.as_str()]).await
        } else {
            bail!("Screen capture is not supported on this platform")
        }
    }

    async fn pointer(&self, x: f64, y: f64, action: PointerAction) -> Result<()> {
        if MACOS {
            run_helper("python3", &["-c", quartz_script(x, y, action).as_str()]).await
        } else if LINUX {
            // xdotool wants integer pixels
            let (x, y) = (x.round().to_string(), y.round().to_string());
            match action {
                PointerAction::Move => run_helper("xdotool", &["mousemove", x.as_str(), y.as_str()]).await,
                PointerAction::Click => {
                    run_helper("xdotool", &["mousemove", x.as_str(), y.as_str(), "click", "1"]).await
                }
            }
        } else {
            bail!("Pointer {} is not supported on this platform", action.as_str())
        }
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        if MACOS {
            let script = format!(
                "tell application \"System Events\" to keystroke {}",
                applescript_string(text)
            );
            run_helper("osascript", &["-e", script.as_str()]).await
        } else if LINUX {
            run_helper("xdotool", &["type", "--", text]).await
        } else {
            bail!("Typing is not supported on this platform")
        }
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        open::that_detached(url).with_context(|| format!("Failed to open {}", url))
    }

    async fn open_app(&self, app: &str) -> Result<()> {
        if MACOS {
            return run_helper("open", &["-a", app]).await;
        }

        Command::new(app)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("{}: failed to launch", app))?;
        Ok(())
    }
}
