use common::Database;

use crate::ipfs::IpfsClient;
use crate::storage::ObjectStorage;

pub struct AppState {
    pub db: Database,
    pub storage: ObjectStorage,
    /// `None` when no IPFS endpoint is configured.
    pub ipfs: Option<IpfsClient>,
    pub max_upload_bytes: usize,
    pub helio_webhook_token: Option<String>,
    /// Shared secret of the checkout backend; `None` disables
    /// `POST /wallet/purchase/confirm`.
    pub payment_confirm_token: Option<String>,
}
