// ── Entity store ──
//
// The cache is shared by every reader; writes from the connection side go
// through a `FencedWriter` so a superseded connection cannot touch it.

mod cache;
mod fence;
mod subscribers;

pub use cache::{EntityCache, Snapshot};
pub use fence::{Epoch, FencedWriter};
pub use subscribers::{Listener, Subscription};
