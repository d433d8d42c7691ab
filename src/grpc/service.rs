//! Bruteguard gRPC service implementation.

use std::sync::Arc;
use std::time::Instant;

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::proto::{
    bruteguard_server::Bruteguard, AllowAuthorizationRequest, AllowAuthorizationResponse,
    CleanBucketRequest, Empty, NetworkListResponse, NetworkRequest,
};
use crate::access::{parse_network, ListKind};
use crate::engine::Authorizer;

/// Implementation of the Bruteguard gRPC interface.
pub struct BruteguardServiceImpl {
    authorizer: Arc<Authorizer>,
}

impl BruteguardServiceImpl {
    pub fn new(authorizer: Arc<Authorizer>) -> Self {
        Self { authorizer }
    }

    async fn add_network(&self, list: ListKind, network: &str) -> Result<Response<Empty>, Status> {
        let network = parse_network(network).inspect_err(|e| warn!(error = %e, "Rejected network"))?;
        self.authorizer.add_network(list, network).await?;
        info!(%list, %network, "Network added");
        Ok(Response::new(Empty {}))
    }

    async fn delete_network(
        &self,
        list: ListKind,
        network: &str,
    ) -> Result<Response<Empty>, Status> {
        let network = parse_network(network).inspect_err(|e| warn!(error = %e, "Rejected network"))?;
        self.authorizer.delete_network(list, network).await?;
        info!(%list, %network, "Network deleted");
        Ok(Response::new(Empty {}))
    }

    fn list(&self, list: ListKind) -> Response<NetworkListResponse> {
        Response::new(NetworkListResponse {
            networks: self.authorizer.networks(list),
        })
    }
}

#[tonic::async_trait]
impl Bruteguard for BruteguardServiceImpl {
    /// Decide whether an authentication attempt may proceed.
    ///
    /// The password is never logged.
    #[instrument(
        skip(self, request),
        fields(
            request_id = %Uuid::new_v4(),
            ip = %request.get_ref().ip,
            login = %request.get_ref().login,
        )
    )]
    async fn allow_authorization(
        &self,
        request: Request<AllowAuthorizationRequest>,
    ) -> Result<Response<AllowAuthorizationResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();

        let allow = self
            .authorizer
            .allow_authorization(&req.ip, &req.login, &req.password)
            .inspect_err(|e| warn!(error = %e, "Rejected authorization request"))?;

        info!(allow, duration = ?started.elapsed(), "Authorization decision made");
        Ok(Response::new(AllowAuthorizationResponse { allow }))
    }

    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    async fn add_network_to_whitelist(
        &self,
        request: Request<NetworkRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.add_network(ListKind::Whitelist, &request.get_ref().network)
            .await
    }

    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    async fn delete_network_from_whitelist(
        &self,
        request: Request<NetworkRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.delete_network(ListKind::Whitelist, &request.get_ref().network)
            .await
    }

    async fn whitelist(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<NetworkListResponse>, Status> {
        Ok(self.list(ListKind::Whitelist))
    }

    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    async fn add_network_to_blacklist(
        &self,
        request: Request<NetworkRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.add_network(ListKind::Blacklist, &request.get_ref().network)
            .await
    }

    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    async fn delete_network_from_blacklist(
        &self,
        request: Request<NetworkRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.delete_network(ListKind::Blacklist, &request.get_ref().network)
            .await
    }

    async fn blacklist(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<NetworkListResponse>, Status> {
        Ok(self.list(ListKind::Blacklist))
    }

    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    async fn clean_bucket_ip(
        &self,
        request: Request<CleanBucketRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.authorizer.clean_bucket_ip(&request.get_ref().key)?;
        Ok(Response::new(Empty {}))
    }

    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    async fn clean_bucket_password(
        &self,
        request: Request<CleanBucketRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.authorizer
            .limiter()
            .clean_bucket_password(&request.get_ref().key)?;
        Ok(Response::new(Empty {}))
    }

    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    async fn clean_bucket_login(
        &self,
        request: Request<CleanBucketRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.authorizer
            .limiter()
            .clean_bucket_login(&request.get_ref().key)?;
        Ok(Response::new(Empty {}))
    }
}
