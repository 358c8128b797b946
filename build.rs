// Generates the tonic client/server stubs for the analytics RPC service.
// The prost messages live in src/rpc/proto.rs, so no protoc is needed here.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/analytics.proto");

    let record_click = tonic_build::manual::Method::builder()
        .name("record_click")
        .route_name("RecordClick")
        .input_type("crate::rpc::proto::RecordClickRequest")
        .output_type("crate::rpc::proto::RecordClickResponse")
        .codec_path("tonic::codec::ProstCodec")
        .build();

    let service = tonic_build::manual::Service::builder()
        .name("AnalyticsService")
        .package("analytics")
        .method(record_click)
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}
