mod aws_cli_provider;
mod ssh_session;

#[rustfmt::skip]
pub use self::{
    aws_cli_provider::AwsCliProvider,
    ssh_session::SshConnector,
};
