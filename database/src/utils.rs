use crate::DB;
use std::sync::Arc;
use tempfile::TempDir;

/// Creates a DB within a temp directory for testing. The directory lives as
/// long as the returned guard, so callers must keep it in scope.
pub fn create_temp_db() -> (TempDir, Arc<DB>) {
    let db_tempdir = tempfile::tempdir().unwrap();
    let db = Arc::new(DB::open_default(db_tempdir.path().to_str().unwrap()).unwrap());
    (db_tempdir, db)
}
