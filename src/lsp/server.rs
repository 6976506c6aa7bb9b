//! tower-lsp based language server implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tower_lsp::jsonrpc::Result as RpcResult;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::inventory::StepInventory;
use crate::loader;
use crate::model::StepDefinition;
use crate::render;

use super::completion;
use super::definition;
use super::diagnostics;
use super::hover;
use super::scanner::{self, CursorContext};

const DEBOUNCE_DELAY_MS: u64 = 300;

/// Lifecycle of the step inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildState {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Clone)]
struct Document {
    version: i32,
    text: String,
}

/// Options for running the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    /// The server runs co-located with the editor; enables the hot reload
    /// handshake.
    pub embedded: bool,
}

/// Shared state cloned into spawned tasks via Arc.
struct State {
    client: Client,
    options: ServerOptions,
    config: RwLock<Arc<ServerConfig>>,
    inventory: RwLock<Arc<StepInventory>>,
    rebuild_state: RwLock<RebuildState>,
    /// Serializes rebuilds; concurrent callers coalesce onto the in-flight
    /// one.
    rebuild_serial: Mutex<()>,
    root_path: RwLock<Option<PathBuf>>,
    documents: DashMap<Url, Document>,
    diagnostic_tokens: DashMap<Url, watch::Sender<()>>,
}

impl State {
    fn new(client: Client, options: ServerOptions) -> Self {
        State {
            client,
            options,
            config: RwLock::new(Arc::new(ServerConfig::default())),
            inventory: RwLock::new(Arc::new(StepInventory::default())),
            rebuild_state: RwLock::new(RebuildState::Idle),
            rebuild_serial: Mutex::new(()),
            root_path: RwLock::new(None),
            documents: DashMap::new(),
            diagnostic_tokens: DashMap::new(),
        }
    }

    /// Snapshot of the active inventory; never blocks on a rebuild in
    /// flight.
    fn inventory(&self) -> Arc<StepInventory> {
        self.inventory.read().clone()
    }

    fn config(&self) -> Arc<ServerConfig> {
        self.config.read().clone()
    }

    fn root(&self) -> Option<PathBuf> {
        self.root_path.read().clone()
    }

    /// Serialized, coalescing inventory rebuild. A caller that was queued
    /// behind a completed rebuild observes its result instead of loading
    /// again.
    async fn rebuild_inventory(self: &Arc<Self>) -> Result<(), ServerError> {
        self.rebuild_with(|root, config| loader::load_inventory(&root, &config))
            .await
    }

    async fn rebuild_with<F>(self: &Arc<Self>, load: F) -> Result<(), ServerError>
    where
        F: FnOnce(PathBuf, Arc<ServerConfig>) -> Result<Vec<StepDefinition>, ServerError>
            + Send
            + 'static,
    {
        let Some(root) = self.root() else {
            return Err(ServerError::SourceLoadFailed(
                "no workspace root received from the client".to_string(),
            ));
        };

        let observed = self.inventory().revision();
        let _serial = self.rebuild_serial.lock().await;
        if self.inventory().revision() > observed {
            debug!("rebuild coalesced with one that just completed");
            return Ok(());
        }

        *self.rebuild_state.write() = RebuildState::Loading;
        let config = self.config();
        let timeout = config.source_load_timeout;
        let task = tokio::task::spawn_blocking(move || load(root, config));

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ServerError::Internal(join_error.to_string())),
            Err(_) => Err(ServerError::SourceLoadFailed(format!(
                "loading step definitions timed out after {timeout:?}"
            ))),
        };

        match result {
            Ok(definitions) => {
                let inventory = StepInventory::build(definitions, observed + 1);
                info!(
                    steps = inventory.len(),
                    revision = inventory.revision(),
                    "step inventory rebuilt"
                );
                *self.inventory.write() = Arc::new(inventory);
                *self.rebuild_state.write() = RebuildState::Ready;
                Ok(())
            }
            Err(err) => {
                error!(tag = err.tag(), "{err}");
                *self.rebuild_state.write() = RebuildState::Failed(err.to_string());
                self.client
                    .show_message(MessageType::ERROR, "failed to create step inventory")
                    .await;
                Err(err)
            }
        }
    }

    async fn rebuild_and_revalidate(self: &Arc<Self>) {
        if self.rebuild_inventory().await.is_ok() {
            let open: Vec<Url> = self
                .documents
                .iter()
                .map(|entry| entry.key().clone())
                .collect();
            for uri in open {
                self.publish_diagnostics(uri).await;
            }
        }
    }

    async fn publish_diagnostics(&self, uri: Url) {
        let Some(document) = self.documents.get(&uri).map(|entry| entry.clone()) else {
            return;
        };
        let inventory = self.inventory();
        let path = uri.to_file_path().ok();
        let items = diagnostics::validate(&document.text, path.as_deref(), &inventory);
        self.client
            .publish_diagnostics(uri, items, Some(document.version))
            .await;
    }

    /// Replaces any pending diagnostics run for the document; only one run
    /// per document is ever in flight.
    fn queue_diagnostics(self: &Arc<Self>, uri: Url) {
        if let Some((_, superseded)) = self.diagnostic_tokens.remove(&uri) {
            let _ = superseded.send(());
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(());
        self.diagnostic_tokens.insert(uri.clone(), cancel_tx);

        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(DEBOUNCE_DELAY_MS)) => {
                    state.publish_diagnostics(uri).await;
                }
                _ = cancel_rx.changed() => {}
            }
        });
    }
}

pub struct Backend {
    state: Arc<State>,
}

impl Backend {
    fn new(client: Client, options: ServerOptions) -> Self {
        Backend {
            state: Arc::new(State::new(client, options)),
        }
    }

    fn current_line(&self, uri: &Url, line: u32) -> Option<(String, String)> {
        let document = self.state.documents.get(uri)?;
        let text = document.text.clone();
        let line = text.lines().nth(line as usize).unwrap_or("").to_string();
        Some((text, line))
    }

    /// `grizzly-ls/install`: prepare the environment and build the
    /// inventory, reporting progress through window messages.
    async fn install(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        debug!("grizzly-ls/install: {params:?}");
        let state = Arc::clone(&self.state);
        state
            .client
            .show_message(MessageType::INFO, "building step inventory")
            .await;
        tokio::spawn(async move {
            state.rebuild_and_revalidate().await;
        });
        Ok(serde_json::Value::Null)
    }

    /// `grizzly-ls/rebuild-inventory`.
    async fn rebuild_inventory_request(
        &self,
        _params: serde_json::Value,
    ) -> RpcResult<serde_json::Value> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.rebuild_and_revalidate().await;
        });
        Ok(serde_json::Value::Null)
    }

    /// `grizzly-ls/run-diagnostics` with body `{uri}`.
    async fn run_diagnostics(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        #[derive(Deserialize)]
        struct Params {
            uri: Url,
        }

        let params: Params = serde_json::from_value(params)
            .map_err(|err| tower_lsp::jsonrpc::Error::invalid_params(err.to_string()))?;
        self.state.publish_diagnostics(params.uri).await;
        Ok(serde_json::Value::Null)
    }

    /// `grizzly-ls/render-gherkin` with body `{content, uri, on_the_fly?}`
    /// returning `[success, rendered]`. Diagnostics emission is independent
    /// of previewing.
    async fn render_gherkin(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        #[derive(Deserialize)]
        struct Params {
            content: String,
            uri: String,
            #[serde(default)]
            #[allow(dead_code)]
            on_the_fly: bool,
        }

        let params: Params = serde_json::from_value(params)
            .map_err(|err| tower_lsp::jsonrpc::Error::invalid_params(err.to_string()))?;

        let path = Url::parse(&params.uri)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(&params.uri));

        match render::render(&params.content, &path) {
            Ok(rendered) => Ok(json!([true, rendered])),
            Err(err) => {
                let err = ServerError::RenderFailed(err);
                warn!(tag = err.tag(), "{err}");
                Ok(json!([false, err.to_string()]))
            }
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> RpcResult<InitializeResult> {
        #[allow(deprecated)]
        let root = params
            .root_uri
            .as_ref()
            .and_then(|uri| uri.to_file_path().ok());
        if let Some(root) = root {
            info!(root = %root.display(), "workspace root");
            *self.state.root_path.write() = Some(root);
        } else {
            warn!("neither root path nor root uri was received from the client");
        }

        match ServerConfig::from_initialization_options(params.initialization_options) {
            Ok(config) => *self.state.config.write() = Arc::new(config),
            Err(err) => {
                error!("{err}");
                self.state
                    .client
                    .show_message(MessageType::ERROR, err.to_string())
                    .await;
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!(
            "{name} (v{version}) server initialized",
            name = env!("CARGO_PKG_NAME"),
            version = env!("CARGO_PKG_VERSION")
        );
        if self.state.options.embedded {
            debug!("running embedded, hot reload handshake enabled");
        }

        if self.state.root().is_some() {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let _ = state.rebuild_inventory().await;
            });
        }
    }

    async fn shutdown(&self) -> RpcResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.state.documents.insert(
            uri.clone(),
            Document {
                version: params.text_document.version,
                text: params.text_document.text,
            },
        );
        self.state.publish_diagnostics(uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        self.state.documents.insert(
            uri.clone(),
            Document {
                version: params.text_document.version,
                text: change.text,
            },
        );

        if !self.state.config().diagnostics_on_save_only {
            self.state.queue_diagnostics(uri);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        if self.state.config().diagnostics_on_save_only {
            self.state.publish_diagnostics(params.text_document.uri).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some((_, pending)) = self.state.diagnostic_tokens.remove(&uri) {
            let _ = pending.send(());
        }
        self.state.documents.remove(&uri);
        self.state.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn completion(&self, params: CompletionParams) -> RpcResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some((source, line)) = self.current_line(&uri, position.line) else {
            return Ok(None);
        };

        let inventory = self.state.inventory();
        let config = self.state.config();
        if inventory.is_empty() {
            match &*self.state.rebuild_state.read() {
                RebuildState::Loading => {
                    debug!("inventory rebuild in flight, serving best-effort results")
                }
                RebuildState::Failed(reason) => warn!("no steps in inventory: {reason}"),
                _ => warn!("no steps in inventory"),
            }
        }

        let context = scanner::classify(&source, position.line as usize, position.character as usize);
        debug!(?context, "completion request");

        let items = match context {
            CursorContext::VariableRef { partial } => completion::complete_variable_name(
                &config,
                &source,
                &line,
                position,
                partial.as_deref(),
            ),
            CursorContext::Metadata => completion::complete_metadata(&line, position),
            CursorContext::Step {
                kind,
                text: Some(text),
                slot: Some(slot),
                ..
            } => {
                let values =
                    completion::complete_argument(&inventory, kind, &text, position, slot);
                if values.is_empty() {
                    completion::complete_step(&inventory, kind, &line, position, Some(&text))
                } else {
                    values
                }
            }
            CursorContext::Step { kind, text, .. } => {
                completion::complete_step(&inventory, kind, &line, position, text.as_deref())
            }
            CursorContext::Keyword { partial } => {
                completion::complete_keyword(&source, partial.as_deref(), position)
            }
            CursorContext::Outside => Vec::new(),
        };

        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: false,
            items,
        })))
    }

    async fn hover(&self, params: HoverParams) -> RpcResult<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some((source, line)) = self.current_line(&uri, position.line) else {
            return Ok(None);
        };

        let (keyword, _) = scanner::step_parts(&line);
        match keyword {
            Some(keyword) if scanner::is_step_keyword(&keyword) => {}
            _ => return Ok(None),
        }

        let lines: Vec<&str> = source.lines().collect();
        let kind = scanner::effective_verb(&lines, position.line as usize);
        Ok(hover::hover(
            &self.state.inventory(),
            kind,
            &line,
            position,
        ))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> RpcResult<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some((source, line)) = self.current_line(&uri, position.line) else {
            return Ok(None);
        };

        if let Some(root) = self.state.root() {
            let links = definition::payload_links(&root, &line, position);
            if !links.is_empty() {
                return Ok(Some(GotoDefinitionResponse::Link(links)));
            }
        }

        let lines: Vec<&str> = source.lines().collect();
        let kind = scanner::effective_verb(&lines, position.line as usize);
        let link =
            definition::step_definition_link(&self.state.inventory(), kind, &line, position);
        Ok(link.map(|link| GotoDefinitionResponse::Link(vec![link])))
    }
}

fn build_service(options: ServerOptions) -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::build(move |client| Backend::new(client, options))
        .custom_method("grizzly-ls/install", Backend::install)
        .custom_method("grizzly-ls/rebuild-inventory", Backend::rebuild_inventory_request)
        .custom_method("grizzly-ls/run-diagnostics", Backend::run_diagnostics)
        .custom_method("grizzly-ls/render-gherkin", Backend::render_gherkin)
        .finish()
}

/// Serves the language server over stdio.
pub async fn serve_stdio(options: ServerOptions) {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = build_service(options);
    Server::new(stdin, stdout, socket).serve(service).await;
}

/// Serves the language server over TCP, one session per connection.
pub async fn serve_tcp(host: &str, port: u16, options: ServerOptions) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("listening on {host}:{port}");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("client connected from {peer}");
        let (read, write) = tokio::io::split(stream);
        let (service, socket) = build_service(options);
        tokio::spawn(async move {
            Server::new(read, write, socket).serve(service).await;
        });
    }
}
