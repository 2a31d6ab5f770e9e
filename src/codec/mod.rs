//! Wire-format codecs for the three framings this server speaks: the
//! smart-socket request/response atoms, the binary sync sub-protocol
//! frames, and Shell Protocol v2 packets.

pub mod shell_packet;
pub mod smart_socket;
pub mod sync_frame;
