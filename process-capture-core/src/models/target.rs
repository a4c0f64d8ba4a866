use serde::{Deserialize, Serialize};

/// What a capture session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureTarget {
    /// Audio rendered by one process, optionally including its child-process tree.
    Process { pid: u32, include_tree: bool },
    /// Everything rendered to the default output device.
    SystemWide,
}

impl CaptureTarget {
    pub fn process(pid: u32, include_tree: bool) -> Self {
        Self::Process { pid, include_tree }
    }

    /// Maps a raw process id to a target, treating pid 0 as "system-wide".
    pub fn from_pid(pid: u32, include_tree: bool) -> Self {
        if pid == 0 {
            Self::SystemWide
        } else {
            Self::Process { pid, include_tree }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Process { pid, .. } => Some(*pid),
            Self::SystemWide => None,
        }
    }

    pub fn is_system_wide(&self) -> bool {
        matches!(self, Self::SystemWide)
    }
}

impl std::fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process { pid, include_tree } if *include_tree => write!(f, "pid {pid} (+tree)"),
            Self::Process { pid, .. } => write!(f, "pid {pid}"),
            Self::SystemWide => f.write_str("system-wide"),
        }
    }
}
