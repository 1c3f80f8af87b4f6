//! Compiles `proto/stigmer/v1/*.proto` into the `stigmer::grpc::pb` module
//! tree via `tonic-build`/`prost` (spec §6 "defined under
//! `proto/stigmer/v1/*.proto` and compiled by `build.rs`").

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_files = [
        "proto/stigmer/v1/common.proto",
        "proto/stigmer/v1/agent.proto",
        "proto/stigmer/v1/agent_instance.proto",
        "proto/stigmer/v1/session.proto",
        "proto/stigmer/v1/agent_execution.proto",
        "proto/stigmer/v1/environment.proto",
        "proto/stigmer/v1/skill.proto",
        "proto/stigmer/v1/workflow.proto",
        "proto/stigmer/v1/workflow_instance.proto",
        "proto/stigmer/v1/workflow_execution.proto",
    ];

    let descriptor_path = std::path::PathBuf::from(std::env::var("OUT_DIR")?).join("stigmer_descriptor.bin");

    tonic_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&proto_files, &["proto"])?;

    for file in proto_files {
        println!("cargo:rerun-if-changed={file}");
    }
    Ok(())
}
