//! gRPC plugin server.
//!
//! [`ProviderService`] is the Rust-typed face of the provider protocol;
//! [`serve`] binds it to a local port, prints the handshake line on stdout
//! and answers the host until a shutdown signal arrives.
//!
//! # Signal Handling
//!
//! On SIGTERM or SIGINT the server stops accepting connections, gives
//! in-flight requests [`ServeOptions::shutdown_timeout`] to finish, then
//! calls [`ProviderService::stop`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated as proto;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, ResourceState, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};

/// Operations a provider answers.
///
/// State documents travel as JSON. Create, read and update return a
/// [`ResourceState`] so warnings reach the host next to the state.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Full schema of the provider config, resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names, derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    /// Check a provider configuration without applying it.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Apply the provider configuration.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Release resources before exit.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check a resource configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Migrate state written by an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Compute the planned state. A `Null` proposed state plans a delete.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create the object described by `planned_state`.
    async fn create(&self, resource_type: &str, planned_state: Value)
        -> Result<ResourceState, ProviderError>;

    /// Refresh `current_state`. A `Null` state means the object is gone.
    async fn read(&self, resource_type: &str, current_state: Value)
        -> Result<ResourceState, ProviderError>;

    /// Move the object from `prior_state` to `planned_state`.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceState, ProviderError>;

    /// Remove the object.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Adopt existing objects identified by `id`.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Sdk(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    /// Check a data source configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read a data source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Unknown data source type: {}",
            data_source_type
        )))
    }
}

/// Decode a JSON payload. Empty or malformed bytes read as `Null`.
fn decode(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

/// Encode a JSON payload. `Null` becomes the empty payload.
fn encode(value: &Value) -> Vec<u8> {
    if value.is_null() {
        return Vec::new();
    }
    serde_json::to_vec(value).unwrap_or_default()
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| proto::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_proto(err: ProviderError) -> Vec<proto::Diagnostic> {
    diagnostics_to_proto(vec![Diagnostic::error(err.to_string())])
}

fn log_diagnostics(operation: &str, subject: &str, diagnostics: &[Diagnostic]) {
    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    if errors > 0 {
        warn!(subject, errors, "{operation} completed with errors");
    } else {
        info!(subject, warnings = diagnostics.len(), "{operation} completed");
    }
}

fn schema_to_proto(schema: &crate::schema::Schema) -> proto::Schema {
    let block = &schema.block;
    let mut attributes: Vec<proto::Attribute> = block
        .attributes
        .iter()
        .map(|(name, attr)| proto::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: attr.force_new,
            default_value: attr
                .default
                .as_ref()
                .map(|v| serde_json::to_vec(v).unwrap_or_default())
                .unwrap_or_default(),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    proto::Schema {
        version: schema.version as i64,
        block: Some(proto::Block {
            attributes,
            description: block.description.clone().unwrap_or_default(),
        }),
    }
}

/// Adapts a [`ProviderService`] to the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

#[tonic::async_trait]
impl<P: ProviderService> proto::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: Request<proto::GetMetadataRequest>,
    ) -> Result<Response<proto::GetMetadataResponse>, Status> {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        Ok(Response::new(proto::GetMetadataResponse {
            server_capabilities: Some(proto::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: Request<proto::GetSchemaRequest>,
    ) -> Result<Response<proto::GetSchemaResponse>, Status> {
        let schema = self.provider.schema();
        debug!(resources = schema.resources.len(), "GetSchema completed");
        Ok(Response::new(proto::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: Request<proto::ValidateProviderConfigRequest>,
    ) -> Result<Response<proto::ValidateProviderConfigResponse>, Status> {
        let config = decode(&request.into_inner().config);
        let diagnostics = match self.provider.validate_provider_config(config).await {
            Ok(diagnostics) => {
                log_diagnostics("ValidateProviderConfig", "provider", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                error_to_proto(e)
            },
        };
        Ok(Response::new(proto::ValidateProviderConfigResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: Request<proto::ConfigureRequest>,
    ) -> Result<Response<proto::ConfigureResponse>, Status> {
        let config = decode(&request.into_inner().config);
        let diagnostics = match self.provider.configure(config).await {
            Ok(diagnostics) => {
                log_diagnostics("Configure", "provider", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_to_proto(e)
            },
        };
        Ok(Response::new(proto::ConfigureResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: Request<proto::StopRequest>,
    ) -> Result<Response<proto::StopResponse>, Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(Response::new(proto::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config", fields(resource_type = tracing::field::Empty))]
    async fn validate_resource_config(
        &self,
        request: Request<proto::ValidateResourceConfigRequest>,
    ) -> Result<Response<proto::ValidateResourceConfigResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let config = decode(&req.config);

        let diagnostics = match self
            .provider
            .validate_resource_config(&req.resource_type, config)
            .await
        {
            Ok(diagnostics) => {
                log_diagnostics("ValidateResourceConfig", &req.resource_type, &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateResourceConfig failed");
                error_to_proto(e)
            },
        };
        Ok(Response::new(proto::ValidateResourceConfigResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state", fields(resource_type = tracing::field::Empty))]
    async fn upgrade_resource_state(
        &self,
        request: Request<proto::UpgradeResourceStateRequest>,
    ) -> Result<Response<proto::UpgradeResourceStateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let state = decode(&req.raw_state);

        let response = match self
            .provider
            .upgrade_resource_state(&req.resource_type, req.version, state)
            .await
        {
            Ok(upgraded) => proto::UpgradeResourceStateResponse {
                upgraded_state: encode(&upgraded),
                diagnostics: vec![],
            },
            Err(e) => {
                error!(version = req.version, error = %e, "UpgradeResourceState failed");
                proto::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_to_proto(e),
                }
            },
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.plan", fields(resource_type = tracing::field::Empty))]
    async fn plan(
        &self,
        request: Request<proto::PlanRequest>,
    ) -> Result<Response<proto::PlanResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let prior_state = Some(decode(&req.prior_state)).filter(|v| !v.is_null());
        let proposed_state = decode(&req.proposed_state);
        let config = decode(&req.config);

        let response = match self
            .provider
            .plan(&req.resource_type, prior_state, proposed_state, config)
            .await
        {
            Ok(result) => {
                info!(
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "Plan completed"
                );
                proto::PlanResponse {
                    planned_state: encode(&result.planned_state),
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: result.requires_replace,
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Plan failed");
                proto::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_proto(e),
                }
            },
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.create", fields(resource_type = tracing::field::Empty))]
    async fn create(
        &self,
        request: Request<proto::CreateRequest>,
    ) -> Result<Response<proto::CreateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let planned_state = decode(&req.planned_state);

        let (state, diagnostics) = applied(
            "Create",
            self.provider.create(&req.resource_type, planned_state).await,
        );
        Ok(Response::new(proto::CreateResponse { state, diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.read", fields(resource_type = tracing::field::Empty))]
    async fn read(
        &self,
        request: Request<proto::ReadRequest>,
    ) -> Result<Response<proto::ReadResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let current_state = decode(&req.current_state);

        let (state, diagnostics) = applied(
            "Read",
            self.provider.read(&req.resource_type, current_state).await,
        );
        Ok(Response::new(proto::ReadResponse { state, diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.update", fields(resource_type = tracing::field::Empty))]
    async fn update(
        &self,
        request: Request<proto::UpdateRequest>,
    ) -> Result<Response<proto::UpdateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let prior_state = decode(&req.prior_state);
        let planned_state = decode(&req.planned_state);

        let (state, diagnostics) = applied(
            "Update",
            self.provider
                .update(&req.resource_type, prior_state, planned_state)
                .await,
        );
        Ok(Response::new(proto::UpdateResponse { state, diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.delete", fields(resource_type = tracing::field::Empty))]
    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let current_state = decode(&req.current_state);

        let diagnostics = match self.provider.delete(&req.resource_type, current_state).await {
            Ok(()) => {
                info!("Delete completed");
                vec![]
            },
            Err(e) => {
                error!(error = %e, "Delete failed");
                error_to_proto(e)
            },
        };
        Ok(Response::new(proto::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state", fields(resource_type = tracing::field::Empty, id = tracing::field::Empty))]
    async fn import_resource_state(
        &self,
        request: Request<proto::ImportResourceStateRequest>,
    ) -> Result<Response<proto::ImportResourceStateResponse>, Status> {
        let req = request.into_inner();
        let span = tracing::Span::current();
        span.record("resource_type", req.resource_type.as_str());
        span.record("id", req.id.as_str());

        let response = match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => {
                info!(imported = imported.len(), "ImportResourceState completed");
                proto::ImportResourceStateResponse {
                    imported: imported
                        .into_iter()
                        .map(|r| proto::ImportedResource {
                            resource_type: r.resource_type,
                            state: encode(&r.state),
                        })
                        .collect(),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "ImportResourceState failed");
                proto::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_to_proto(e),
                }
            },
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.validate_data_source_config", fields(data_source_type = tracing::field::Empty))]
    async fn validate_data_source_config(
        &self,
        request: Request<proto::ValidateDataSourceConfigRequest>,
    ) -> Result<Response<proto::ValidateDataSourceConfigResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let config = decode(&req.config);

        let diagnostics = match self
            .provider
            .validate_data_source_config(&req.data_source_type, config)
            .await
        {
            Ok(diagnostics) => {
                log_diagnostics("ValidateDataSourceConfig", &req.data_source_type, &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateDataSourceConfig failed");
                error_to_proto(e)
            },
        };
        Ok(Response::new(proto::ValidateDataSourceConfigResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.read_data_source", fields(data_source_type = tracing::field::Empty))]
    async fn read_data_source(
        &self,
        request: Request<proto::ReadDataSourceRequest>,
    ) -> Result<Response<proto::ReadDataSourceResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let config = decode(&req.config);

        let response = match self
            .provider
            .read_data_source(&req.data_source_type, config)
            .await
        {
            Ok(state) => {
                info!("ReadDataSource completed");
                proto::ReadDataSourceResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "ReadDataSource failed");
                proto::ReadDataSourceResponse {
                    state: vec![],
                    diagnostics: error_to_proto(e),
                }
            },
        };
        Ok(Response::new(response))
    }
}

/// Split an apply result into the wire state and diagnostics.
fn applied(
    operation: &str,
    result: Result<ResourceState, ProviderError>,
) -> (Vec<u8>, Vec<proto::Diagnostic>) {
    match result {
        Ok(resource) => {
            info!(
                removed = resource.state.is_null(),
                warnings = resource.diagnostics.len(),
                "{operation} completed"
            );
            (encode(&resource.state), diagnostics_to_proto(resource.diagnostics))
        },
        Err(e) => {
            error!(error = %e, "{operation} failed");
            (Vec::new(), error_to_proto(e))
        },
    }
}

/// Options for the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests get after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for SIGTERM or SIGINT (CTRL+C on Windows).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
        info!("received CTRL+C");
    }

    #[cfg(not(any(unix, windows)))]
    std::future::pending::<()>().await;
}

/// Serve a provider on an ephemeral local port.
///
/// Prints `HEMMER_PROVIDER|<version>|<address>` on stdout once listening.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// [`serve`] with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options).await
}

/// Serve a provider on a fixed address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// [`serve_on`] with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    serve_on_listener(provider, listener, options).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "provider server starting");

    let provider = Arc::new(provider);
    let service = proto::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async move {
                wait_for_shutdown_signal().await;
                let _ = signalled_tx.send(());
            },
        );
    tokio::pin!(server);

    // The drain timeout only starts once a signal has been received.
    tokio::select! {
        result = &mut server => result?,
        _ = signalled_rx => {
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(timeout = ?options.shutdown_timeout, "shutdown timeout exceeded, forcing shutdown"),
            }
        },
    }

    if let Err(e) = provider.stop().await {
        warn!(error = %e, "provider stop returned an error");
    }
    info!("provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Schema};
    use serde_json::json;

    #[test]
    fn test_decode_empty_and_invalid() {
        assert!(decode(b"").is_null());
        assert!(decode(b"{not json").is_null());
        assert_eq!(decode(br#"{"id":5}"#), json!({"id": 5}));
    }

    #[test]
    fn test_encode_null_is_empty() {
        assert!(encode(&Value::Null).is_empty());
        assert_eq!(encode(&json!({"id": 5})), br#"{"id":5}"#.to_vec());
    }

    #[test]
    fn test_warning_diagnostics_reach_the_wire() {
        let (state, diagnostics) = applied(
            "Create",
            Ok(ResourceState::new(json!({"id": 1}))
                .with_diagnostics(vec![Diagnostic::warning("job did not finish")])),
        );

        assert!(!state.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].severity,
            proto::diagnostic::Severity::Warning as i32
        );
    }

    #[test]
    fn test_failed_apply_has_no_state() {
        let (state, diagnostics) = applied(
            "Update",
            Err(ProviderError::FailedPrecondition("job running".into())),
        );

        assert!(state.is_empty());
        assert_eq!(diagnostics[0].severity, proto::diagnostic::Severity::Error as i32);
        assert!(diagnostics[0].summary.contains("job running"));
    }

    #[test]
    fn test_schema_to_proto_sorts_attributes() {
        let schema = Schema::v0()
            .with_attribute("sleep_interval", Attribute::optional_int64().with_default(json!(20)))
            .with_attribute("baseline_name", Attribute::required_string().with_force_new());

        let proto = schema_to_proto(&schema);
        let block = proto.block.unwrap();

        assert_eq!(block.attributes[0].name, "baseline_name");
        assert!(block.attributes[0].force_new);
        assert_eq!(block.attributes[1].default_value, b"20".to_vec());
    }

    #[test]
    fn test_serve_options() {
        assert_eq!(ServeOptions::default().shutdown_timeout, Duration::from_secs(30));
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
    }
}
