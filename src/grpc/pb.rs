//! Generated proto types for the `stigmer.v1` package (spec §6), compiled
//! by `build.rs` via `tonic-build` from `proto/stigmer/v1/*.proto`.

#![allow(clippy::all)]

tonic::include_proto!("stigmer.v1");

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("stigmer_descriptor");
