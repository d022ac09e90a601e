fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_client(false)
        .build_server(false)
        .compile(
            &["proto/build_event_stream/build_event_stream.proto"],
            &["proto"],
        )?;

    tonic_build::configure()
        .build_client(false)
        .build_server(false)
        .compile(&["proto/blaze_query/build.proto"], &["proto"])?;

    Ok(())
}
