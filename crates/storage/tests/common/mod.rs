pub mod dav_server;
pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use dav_server::DavServer;
#[allow(unused_imports)]
pub use fixtures::{blob_id, seeded_bytes, shard_specs};
#[allow(unused_imports)]
pub use mocks::InstrumentedBackend;
