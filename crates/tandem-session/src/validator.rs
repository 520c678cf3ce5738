//! Admission hook run on the first frame of every socket.
//!
//! The server never invents identities. The client presents an id in its
//! handshake and a [`ClientIdValidator`] decides whether to accept it. The
//! default [`HeaderValidator`] only checks the shape; deployments that
//! need more (an allow-list, a signed token) plug in their own.

use tandem_protocol::ClientId;

use crate::SessionError;

/// Turns the raw id from a handshake into a [`ClientId`], or refuses it.
///
/// # Example
///
/// ```rust
/// use tandem_protocol::ClientId;
/// use tandem_session::{ClientIdValidator, SessionError};
///
/// /// Only lets in ids with a fixed prefix.
/// struct PrefixValidator(&'static str);
///
/// impl ClientIdValidator for PrefixValidator {
///     async fn validate(
///         &self,
///         raw: Option<&str>,
///     ) -> Result<ClientId, SessionError> {
///         let raw = raw.ok_or(SessionError::MissingClientId)?;
///         if !raw.starts_with(self.0) {
///             return Err(SessionError::Rejected(raw.to_string()));
///         }
///         ClientId::parse(raw)
///             .map_err(|_| SessionError::InvalidClientId(raw.to_string()))
///     }
/// }
/// ```
pub trait ClientIdValidator: Send + Sync + 'static {
    /// Validates the id sent in the handshake. `None` means the client
    /// sent no id at all.
    fn validate(
        &self,
        raw: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ClientId, SessionError>> + Send;
}

/// Accepts any well-formed client id.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderValidator;

impl ClientIdValidator for HeaderValidator {
    async fn validate(&self, raw: Option<&str>) -> Result<ClientId, SessionError> {
        let raw = raw.ok_or(SessionError::MissingClientId)?;
        ClientId::parse(raw).map_err(|_| SessionError::InvalidClientId(raw.to_string()))
    }
}
