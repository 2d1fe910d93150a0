use rotbridge_net::ChannelConfig;

use crate::{config::Role, error::ConfigError};

/// Resolve the transport endpoint of a party.
///
/// The initiator listens on `port` and ignores `remote_addr`. The responder
/// connects to `remote_addr:port`, so it needs a non-empty address and a
/// non-zero port.
pub fn resolve(
    role: Role,
    remote_addr: Option<&str>,
    port: u16,
) -> Result<ChannelConfig, ConfigError> {
    match role {
        Role::Initiator => Ok(ChannelConfig::listen(port)),
        Role::Responder => {
            let host = remote_addr
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .ok_or(ConfigError::MissingRemoteAddress)?;
            if port == 0 {
                return Err(ConfigError::InvalidPort(0));
            }
            Ok(ChannelConfig::connect(host, port))
        }
    }
}
