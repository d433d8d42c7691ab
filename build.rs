use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let proto_dir = PathBuf::from("proto");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/");

    // The client is only used by the loopback tests and by operators' tooling.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("bruteguard_descriptor.bin"))
        .compile_protos(
            &[proto_dir.join("bruteguard/v1/bruteguard.proto")],
            &[&proto_dir],
        )?;

    Ok(())
}
