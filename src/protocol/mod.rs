//! Wire-level pieces used to talk to the rpcbind service.
//!
//! - `xdr`: External Data Representation (RFC 4506) for the RPC message
//!   header (RFC 5531) and the RPCBIND `rpcb` mapping (RFC 1833).
//! - `rpcbind`: a blocking UDP client issuing RPCBPROC_SET and
//!   RPCBPROC_UNSET.
//! - `uaddr`: conversion between socket addresses and universal addresses.

pub mod rpcbind;
pub mod uaddr;
pub mod xdr;
