pub mod registration;
pub mod session;

use std::sync::Arc;

use kvs::backup::BackupCoordinator;
use kvs::error::KvResult;
use kvs::gate::CommandGate;
use kvs::notify;
use kvs::store::KvTable;
use kvs::subs::SubscriptionIndex;

use crate::server::session::SessionPool;

/// Process-wide server state, built once in `main` and threaded through.
///
/// Construction order matters: the subscription index exists and the
/// notification fan-out is installed before the session pool starts, which
/// in turn happens before the registration endpoint accepts anyone.
pub struct ServerContext {
    pub table: Arc<KvTable>,
    pub gate: Arc<CommandGate>,
    pub index: Arc<SubscriptionIndex>,
    pub backups: Arc<BackupCoordinator>,
    pub pool: Arc<SessionPool>,
}

impl ServerContext {
    pub fn new(max_backups: usize) -> KvResult<ServerContext> {
        let table = Arc::new(KvTable::new());
        let index = Arc::new(SubscriptionIndex::new());
        notify::install(&table, index.clone());

        let pool = SessionPool::start(table.clone(), index.clone())?;
        Ok(ServerContext {
            table,
            gate: Arc::new(CommandGate::new()),
            index,
            backups: Arc::new(BackupCoordinator::new(max_backups)),
            pool,
        })
    }
}
