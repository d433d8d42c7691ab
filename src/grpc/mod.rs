//! gRPC server module for the Bruteguard service.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::BruteguardServiceImpl;

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("bruteguard.v1");
}

// Re-export commonly used types
pub use proto::{
    bruteguard_client::BruteguardClient, bruteguard_server::BruteguardServer,
    AllowAuthorizationRequest, AllowAuthorizationResponse, CleanBucketRequest, Empty,
    NetworkListResponse, NetworkRequest,
};
