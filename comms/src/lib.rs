mod align;
mod awaitable;
mod batch;
mod context;
mod deserialize;
mod error;
pub mod msg;
mod receiver;
mod remote;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use awaitable::{Awaitable, Resolver};
pub use batch::{RoutedBatch, RoutedIds, SparseBatch, SparseBucketed, SparseFeature};
pub use context::{CommContext, LocalContext, LocalFabric};
pub use deserialize::Deserialize;
pub use error::{CommErr, Result};
pub use receiver::WireReceiver;
pub use remote::RemoteContext;
pub use sender::WireSender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Creates both `WireReceiver` and `WireSender` halves of a rank-to-rank link.
///
/// Given a writer and reader creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a wire receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (WireReceiver<R>, WireSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (WireReceiver::new(rx), WireSender::new(tx))
}
