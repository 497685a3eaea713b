//! Verbatim Language Server Protocol implementation.
//!
//! Keeps the verifier in memory and re-checks an extracted JSON document
//! against its source text on every edit, publishing unmatched words as
//! diagnostics and offering fix requests as code actions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use vbt_core::{
    source::consolidate_pages, Classification, Config, Highlight, VerificationState, Verifier,
};

const CONFIG_FILE: &str = "verbatim.yml";
const FIX_COMMAND: &str = "verbatim.fixWithAssistant";

/// Document state cached by the server.
struct DocumentState {
    content: String,
    version: i32,
}

#[derive(Clone, Default)]
struct Settings {
    /// Explicit source file used for every document instead of sidecars.
    source_path: Option<PathBuf>,
    /// Also publish matched words, as hints.
    report_matched: bool,
}

/// Verbatim Language Server backend.
struct Backend {
    client: Client,
    verifier: RwLock<Arc<Verifier>>,
    documents: DashMap<Url, DocumentState>,
    workspace_root: RwLock<Option<PathBuf>>,
    config_path: RwLock<Option<PathBuf>>,
    settings: RwLock<Settings>,
}

impl Backend {
    fn new(client: Client) -> Self {
        Self {
            client,
            verifier: RwLock::new(Arc::new(Verifier::default())),
            documents: DashMap::new(),
            workspace_root: RwLock::new(None),
            config_path: RwLock::new(None),
            settings: RwLock::new(Settings::default()),
        }
    }

    async fn resolve_path(&self, configured: &str) -> Option<PathBuf> {
        if configured.trim().is_empty() {
            return None;
        }
        let path = PathBuf::from(configured);
        if path.is_absolute() {
            return Some(path);
        }
        let root = self.workspace_root.read().await.clone();
        Some(root.map(|r| r.join(&path)).unwrap_or(path))
    }

    async fn apply_settings(&self, map: &serde_json::Map<String, Value>) {
        if let Some(Value::String(config_path)) = map.get("configPath") {
            *self.config_path.write().await = self.resolve_path(config_path).await;
        }
        let mut settings = self.settings.read().await.clone();
        if let Some(Value::String(source_path)) = map.get("sourcePath") {
            settings.source_path = self.resolve_path(source_path).await;
        }
        if let Some(Value::Bool(report)) = map.get("reportMatched") {
            settings.report_matched = *report;
        }
        *self.settings.write().await = settings;
    }

    async fn reload_verifier(&self) -> anyhow::Result<()> {
        let workspace_root = self.workspace_root.read().await.clone();
        let configured = self.config_path.read().await.clone();
        let resolved = match (configured, workspace_root) {
            (Some(path), _) => path,
            (None, Some(root)) => root.join(CONFIG_FILE),
            (None, None) => return Ok(()),
        };

        let cfg = Config::load_or_default(&resolved)
            .with_context(|| format!("Failed to load {}", resolved.display()))?;
        let verifier = Verifier::new(cfg).context("failed to create verifier")?;
        *self.verifier.write().await = Arc::new(verifier);
        *self.config_path.write().await = Some(resolved.clone());

        self.client
            .log_message(
                MessageType::INFO,
                format!("Verbatim config loaded: {}", resolved.display()),
            )
            .await;

        Ok(())
    }

    async fn report_reload_error(&self, result: anyhow::Result<()>) {
        if let Err(err) = result {
            self.client
                .log_message(
                    MessageType::ERROR,
                    format!("Failed to load config: {err:#}"),
                )
                .await;
        }
    }

    fn is_document(uri: &Url) -> bool {
        uri.path().to_ascii_lowercase().ends_with(".json")
    }

    /// Source pages for a document: the configured source file, or the
    /// sidecar with the source extension. Open buffers win over disk.
    async fn source_for(&self, uri: &Url, verifier: &Verifier) -> Option<String> {
        let source_options = &verifier.config().source;
        let path = match self.settings.read().await.source_path.clone() {
            Some(path) => path,
            None => uri
                .to_file_path()
                .ok()?
                .with_extension(&source_options.sidecar_extension),
        };
        let text = match Url::from_file_path(&path)
            .ok()
            .and_then(|u| self.documents.get(&u).map(|d| d.content.clone()))
        {
            Some(open) => open,
            None => fs::read_to_string(&path).ok()?,
        };
        Some(consolidate_pages(&[text], source_options))
    }

    /// Run the verifier over the cached text of `uri`.
    async fn verify_document(&self, uri: &Url) -> Option<(String, VerificationState)> {
        let content = self.documents.get(uri).map(|d| d.content.clone())?;
        let verifier = self.verifier.read().await.clone();
        let source = self.source_for(uri, &verifier).await.unwrap_or_default();
        let state = verifier.run(&content, &source);
        Some((content, state))
    }

    fn byte_to_position(text: &str, byte_offset: usize) -> Position {
        let byte_offset = byte_offset.min(text.len());
        let mut line: u32 = 0;
        let mut last_newline = 0usize;
        for (idx, ch) in text.char_indices() {
            if idx >= byte_offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                last_newline = idx + 1;
            }
        }
        let character = text[last_newline..byte_offset].encode_utf16().count() as u32;
        Position { line, character }
    }

    fn position_to_byte(text: &str, position: Position) -> usize {
        let mut line_start = 0usize;
        for _ in 0..position.line {
            match text[line_start..].find('\n') {
                Some(idx) => line_start += idx + 1,
                None => return text.len(),
            }
        }
        let mut units = 0u32;
        for (idx, ch) in text[line_start..].char_indices() {
            if units >= position.character || ch == '\n' {
                return line_start + idx;
            }
            units += ch.len_utf16() as u32;
        }
        text.len()
    }

    /// Convert a highlight to an LSP diagnostic.
    fn to_lsp_diagnostic(highlight: &Highlight, text: &str) -> Diagnostic {
        let range = Range {
            start: Self::byte_to_position(text, highlight.span.0),
            end: Self::byte_to_position(text, highlight.span.1),
        };
        let (severity, message) = match highlight.classification {
            Classification::Unmatched => (
                DiagnosticSeverity::WARNING,
                format!("`{}` not found in source ({})", highlight.snippet, highlight.path),
            ),
            Classification::Matched => (
                DiagnosticSeverity::HINT,
                format!("`{}` found in source", highlight.snippet),
            ),
        };

        Diagnostic {
            range,
            severity: Some(severity),
            code: Some(NumberOrString::String(highlight.classification.to_string())),
            code_description: None,
            source: Some("verbatim".to_string()),
            message,
            related_information: None,
            tags: None,
            data: Some(Value::String(highlight.path.clone())),
        }
    }

    /// Publish diagnostics to the client.
    async fn publish_diagnostics(&self, uri: Url) {
        if !Self::is_document(&uri) {
            return;
        }
        let Some((content, state)) = self.verify_document(&uri).await else {
            return;
        };
        let report_matched = self.settings.read().await.report_matched;
        let diagnostics = state
            .highlights
            .iter()
            .filter(|h| report_matched || h.classification == Classification::Unmatched)
            .map(|h| Self::to_lsp_diagnostic(h, &content))
            .collect();

        self.client
            .log_message(
                MessageType::LOG,
                format!(
                    "{}: {} matched / {} unmatched blocks, {}",
                    uri.path(),
                    state.stats.matched_blocks,
                    state.stats.unmatched_blocks,
                    state.stats
                ),
            )
            .await;

        let version = self.documents.get(&uri).map(|d| d.version);
        self.client
            .publish_diagnostics(uri, diagnostics, version)
            .await;
    }

    async fn publish_all(&self) {
        let uris: Vec<Url> = self.documents.iter().map(|e| e.key().clone()).collect();
        for uri in uris {
            self.publish_diagnostics(uri).await;
        }
    }

    async fn is_config(&self, path: &Path) -> bool {
        match self.config_path.read().await.as_ref() {
            Some(config_path) => config_path == path,
            None => path.file_name().is_some_and(|n| n == CONFIG_FILE),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(root_uri) = params.root_uri.or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first().map(|f| f.uri.clone()))
        }) {
            if let Ok(path) = root_uri.to_file_path() {
                *self.workspace_root.write().await = Some(path);
            }
        }

        if let Some(Value::Object(map)) = params.initialization_options {
            self.apply_settings(&map).await;
        }

        let result = self.reload_verifier().await;
        self.report_reload_error(result).await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        work_done_progress_options: WorkDoneProgressOptions {
                            work_done_progress: None,
                        },
                        resolve_provider: Some(false),
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "Verbatim Language Server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Verbatim LSP initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let content = params.text_document.text;
        let version = params.text_document.version;

        let is_source = !Self::is_document(&uri);
        self.documents
            .insert(uri.clone(), DocumentState { content, version });

        if is_source {
            self.publish_all().await;
        } else {
            self.publish_diagnostics(uri).await;
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        if let Some(change) = params.content_changes.into_iter().last() {
            self.documents.insert(
                uri.clone(),
                DocumentState {
                    content: change.text,
                    version,
                },
            );
        }

        if Self::is_document(&uri) {
            self.publish_diagnostics(uri).await;
        } else {
            self.publish_all().await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        let is_config = match uri.to_file_path() {
            Ok(path) => self.is_config(&path).await,
            Err(_) => false,
        };

        if is_config {
            let result = self.reload_verifier().await;
            self.report_reload_error(result).await;
            self.publish_all().await;
        } else {
            self.publish_diagnostics(uri).await;
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        if let Value::Object(map) = params.settings {
            self.apply_settings(&map).await;
        }
        let result = self.reload_verifier().await;
        self.report_reload_error(result).await;
        self.publish_all().await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut should_reload = false;
        for change in &params.changes {
            if let Ok(path) = change.uri.to_file_path() {
                if self.is_config(&path).await {
                    should_reload = true;
                    break;
                }
            }
        }
        if !should_reload {
            return;
        }

        let result = self.reload_verifier().await;
        self.report_reload_error(result).await;
        self.publish_all().await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(&params.text_document.uri);
        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = &params.text_document.uri;
        if !Self::is_document(uri) {
            return Ok(None);
        }
        let Some((content, state)) = self.verify_document(uri).await else {
            return Ok(None);
        };

        let cursor = Self::position_to_byte(&content, params.range.start);
        let Some(request) = state.resolve_fix_target(cursor) else {
            return Ok(None);
        };
        let argument = match serde_json::to_value(&request) {
            Ok(value) => value,
            Err(_) => return Ok(None),
        };

        let diagnostics: Vec<Diagnostic> = params
            .context
            .diagnostics
            .iter()
            .filter(|d| d.source.as_deref() == Some("verbatim"))
            .cloned()
            .collect();

        let action = CodeAction {
            title: format!("Fix `{}` with assistant", request.snippet),
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: (!diagnostics.is_empty()).then_some(diagnostics),
            edit: None,
            command: Some(Command {
                title: "Fix with assistant".to_string(),
                command: FIX_COMMAND.to_string(),
                arguments: Some(vec![argument]),
            }),
            is_preferred: Some(true),
            disabled: None,
            data: None,
        };

        Ok(Some(vec![CodeActionOrCommand::CodeAction(action)]))
    }
}

#[tokio::main]
async fn main() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_count_utf16_units() {
        let text = "{\n  \"title\": \"\u{00E9}t\u{00E9} \u{1F600} ok\"\n}";
        let ok = text.find("ok").unwrap();
        let pos = Backend::byte_to_position(text, ok);
        assert_eq!(pos.line, 1);
        assert_eq!(pos.character, 19);
        assert_eq!(Backend::position_to_byte(text, pos), ok);
    }

    #[test]
    fn positions_past_line_end_clamp_to_it() {
        let text = "ab\ncd";
        let pos = Position {
            line: 0,
            character: 9,
        };
        assert_eq!(Backend::position_to_byte(text, pos), 2);
        let pos = Position {
            line: 7,
            character: 0,
        };
        assert_eq!(Backend::position_to_byte(text, pos), text.len());
    }

    #[test]
    fn only_json_files_are_verified() {
        assert!(Backend::is_document(
            &Url::parse("file:///tmp/act.JSON").unwrap()
        ));
        assert!(!Backend::is_document(
            &Url::parse("file:///tmp/act.txt").unwrap()
        ));
    }
}
