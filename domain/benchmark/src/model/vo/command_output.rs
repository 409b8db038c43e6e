/// What a remote command left behind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    /// `None` when the command was killed or timed out.
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_status == Some(0)
    }

    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }
}
