//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::bruteguard_server::BruteguardServer;
use super::service::BruteguardServiceImpl;
use crate::engine::Authorizer;
use crate::error::{BruteguardError, Result};

/// gRPC server for the Bruteguard service.
pub struct GrpcServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The decision engine behind every request
    authorizer: Arc<Authorizer>,
}

impl GrpcServer {
    /// Create a new gRPC server.
    pub fn new(addr: SocketAddr, authorizer: Arc<Authorizer>) -> Self {
        Self { addr, authorizer }
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let service = BruteguardServiceImpl::new(self.authorizer);

        info!(
            addr = %listener.local_addr()?,
            "Starting gRPC server for Bruteguard"
        );

        Server::builder()
            .add_service(BruteguardServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                BruteguardError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessLists;
    use crate::grpc::proto::bruteguard_client::BruteguardClient;
    use crate::grpc::proto::{
        AllowAuthorizationRequest, CleanBucketRequest, Empty, NetworkRequest,
    };
    use crate::ratelimit::{Algorithm, Limits, RateLimiter, RateLimiterConfig};
    use crate::storage::SqliteStore;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn authorizer() -> Arc<Authorizer> {
        let store = SqliteStore::in_memory().await.unwrap();
        let lists = AccessLists::load(Arc::new(store)).await.unwrap();
        let limiter = RateLimiter::new(RateLimiterConfig {
            algorithm: Algorithm::TokenBucket,
            limits: Limits {
                ip: 1000,
                password: 100,
                login: 2,
            },
            interval: Duration::from_secs(60),
            ttl: Duration::from_secs(600),
            max_idle_ticks: 10,
        })
        .unwrap();
        Arc::new(Authorizer::new(Arc::new(lists), Arc::new(limiter)))
    }

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server = GrpcServer::new(addr, authorizer().await);
        let handle = tokio::spawn(server.serve_with_listener(listener, async {
            let _ = shutdown_rx.await;
        }));

        let mut client = BruteguardClient::connect(format!("http://{}", addr))
            .await
            .unwrap();

        let attempt = || AllowAuthorizationRequest {
            ip: "172.16.0.9".to_string(),
            login: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(client.allow_authorization(attempt()).await.unwrap().into_inner().allow);
        assert!(client.allow_authorization(attempt()).await.unwrap().into_inner().allow);
        assert!(!client.allow_authorization(attempt()).await.unwrap().into_inner().allow);

        client
            .clean_bucket_login(CleanBucketRequest {
                key: "alice".to_string(),
            })
            .await
            .unwrap();
        assert!(client.allow_authorization(attempt()).await.unwrap().into_inner().allow);

        client
            .add_network_to_whitelist(NetworkRequest {
                network: "172.16.0.0/12".to_string(),
            })
            .await
            .unwrap();
        let whitelist = client.whitelist(Empty {}).await.unwrap().into_inner();
        assert_eq!(whitelist.networks, vec!["172.16.0.0/12"]);

        let status = client
            .clean_bucket_password(CleanBucketRequest {
                key: "unknown".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
