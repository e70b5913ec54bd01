//! Session scope.
//!
//! Every host operation runs inside exactly one authenticated session that
//! is released on every exit path. [`scoped`] covers the common case. A
//! [`Session`] dropped without [`Session::release`] (early return, panic,
//! cancelled future) hands the release to the current Tokio runtime.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{Connector, OmeApi};
use crate::error::OmeError;

/// An open OME session.
pub struct Session {
    api: Arc<dyn OmeApi>,
    released: bool,
}

impl Session {
    /// Authenticate through `connector`.
    pub async fn open(connector: &dyn Connector) -> Result<Self, OmeError> {
        let api = connector.open().await?;
        debug!("OME session acquired");
        Ok(Self {
            api,
            released: false,
        })
    }

    /// The API handle bound to this session.
    pub fn api(&self) -> Arc<dyn OmeApi> {
        Arc::clone(&self.api)
    }

    /// Close the session now.
    pub async fn release(mut self) {
        self.released = true;
        self.api.close().await;
        debug!("OME session released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let api = Arc::clone(&self.api);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { api.close().await });
            },
            Err(_) => warn!("OME session dropped outside a runtime, not closed"),
        }
    }
}

/// Run `op` inside a fresh session and release it afterwards, whatever `op`
/// returns.
pub async fn scoped<T, E, F, Fut>(connector: &dyn Connector, op: F) -> Result<T, E>
where
    F: FnOnce(Arc<dyn OmeApi>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<OmeError>,
{
    let session = Session::open(connector).await?;
    let result = op(session.api()).await;
    session.release().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeOme;

    #[tokio::test]
    async fn test_scoped_releases_on_success() {
        let fake = FakeOme::new().with_device(10, "SVC1", &[33]);

        let device = scoped(&fake, |api| async move { api.device(10).await })
            .await
            .unwrap();

        assert_eq!(device.device_service_tag, "SVC1");
        assert_eq!(fake.sessions(), (1, 1));
    }

    #[tokio::test]
    async fn test_scoped_releases_on_error() {
        let fake = FakeOme::new();

        let result = scoped(&fake, |api| async move { api.device(99).await }).await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(fake.sessions(), (1, 1));
    }

    #[tokio::test]
    async fn test_auth_failure_opens_nothing() {
        let fake = FakeOme::new();
        fake.set_reject_login(true);

        let result: Result<(), OmeError> = scoped(&fake, |_api| async { Ok(()) }).await;

        assert!(matches!(result, Err(OmeError::AuthFailed(_))));
        assert_eq!(fake.sessions(), (0, 0));
    }

    #[tokio::test]
    async fn test_dropped_session_is_closed_by_runtime() {
        let fake = FakeOme::new();
        {
            let _session = Session::open(&fake).await.unwrap();
        }
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        assert_eq!(fake.sessions(), (1, 1));
    }

    #[tokio::test]
    async fn test_release_after_close_is_harmless() {
        let fake = FakeOme::new();
        let session = Session::open(&fake).await.unwrap();
        session.api().close().await;
        session.release().await;

        assert_eq!(fake.sessions(), (1, 1));
    }
}
