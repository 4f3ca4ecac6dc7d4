//! RPCBIND protocol (RFC 1833) data structures used to register and
//! unregister a program with the local rpcbind service.

// RFC names are kept as-is
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

/// rpcbind program number (shared with portmap)
pub const PROGRAM: u32 = 100000;
/// RPCBIND protocol version 3
pub const VERSION: u32 = 3;

/// One program-to-address mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct rpcb {
    pub r_prog: u32,
    pub r_vers: u32,
    /// Network identity of the transport
    pub r_netid: String,
    /// Universal address; empty on UNSET
    pub r_addr: String,
    /// Owner of the mapping; empty on UNSET
    pub r_owner: String,
}
DeserializeStruct!(rpcb, r_prog, r_vers, r_netid, r_addr, r_owner);
SerializeStruct!(rpcb, r_prog, r_vers, r_netid, r_addr, r_owner);

/// Procedure numbers of RPCBIND version 3.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum RpcbProc {
    RPCBPROC_NULL = 0,
    RPCBPROC_SET = 1,
    RPCBPROC_UNSET = 2,
    RPCBPROC_GETADDR = 3,
    RPCBPROC_DUMP = 4,
    RPCBPROC_CALLIT = 5,
    RPCBPROC_GETTIME = 6,
    RPCBPROC_UADDR2TADDR = 7,
    RPCBPROC_TADDR2UADDR = 8,
}
impl SerializeEnum for RpcbProc {}
impl DeserializeEnum for RpcbProc {}
