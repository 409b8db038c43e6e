use super::Tag;

/// What the provider hands back for a launch request.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchedInstance {
    pub instance_id: String,
    pub private_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub state: InstanceState,
    pub private_address: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown,
}

impl From<&str> for InstanceState {
    fn from(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

impl InstanceState {
    /// The instance will never reach running anymore.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Terminated | Self::Stopping | Self::Stopped
        )
    }
}
