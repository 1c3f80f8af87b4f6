//! Bridges domain resource types to the `prost::Message` wire format the
//! store persists (spec §4.5: resources are marshaled to proto before
//! being written, never JSON). Reuses the already-generated `pb::<Kind>`
//! full-resource messages (`tonic_build`, see `src/grpc/pb.rs`) as the
//! storage schema rather than a second, parallel proto schema: the gRPC
//! layer and the storage layer agree on one wire shape per kind.

use prost::Message;

use crate::error::{Result, StigmerError};

/// Implemented once per resource kind in `src/storage/codecs.rs`.
/// `to_storage_proto`/`from_storage_proto` carry the same domain<->pb
/// conversion the gRPC services already do at the API boundary; storage
/// just encodes the result with `prost` instead of handing it to tonic.
pub trait StorageCodec: Sized {
    type Proto: Message + Default;

    fn to_storage_proto(&self) -> Self::Proto;
    fn from_storage_proto(proto: Self::Proto) -> Result<Self>;
}

pub fn encode<T: StorageCodec>(value: &T) -> Vec<u8> {
    value.to_storage_proto().encode_to_vec()
}

pub fn decode<T: StorageCodec>(bytes: &[u8]) -> Result<T> {
    let proto = T::Proto::decode(bytes).map_err(StigmerError::from)?;
    T::from_storage_proto(proto)
}
