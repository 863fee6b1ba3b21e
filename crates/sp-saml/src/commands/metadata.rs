use async_trait::async_trait;

use super::{Command, CommandKind, CommandResult, HttpRequestData, Saml2Urls, finish};
use crate::error::SamlResult;
use crate::metadata::MetadataBuilder;
use crate::notifications::MetadataCreated;
use crate::options::Options;

/// Serves this SP's metadata, signed when a signing key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataCommand;

#[async_trait]
impl Command for MetadataCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Metadata
    }

    async fn run(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult> {
        let sp = options.effective_sp_options();
        let urls = Saml2Urls::new(&request.url, &sp, &options.config.module_path);
        let metadata = MetadataBuilder::new(&sp, &urls).build()?;

        options.notifications.metadata_created(&MetadataCreated {
            entity_id: sp.entity_id(),
            metadata: &metadata,
            urls: &urls,
        });

        let mut result = CommandResult::content(metadata, "application/samlmetadata+xml");
        result.headers.insert(
            "Content-Disposition".to_string(),
            format!(
                "attachment; filename=\"{}\"",
                metadata_file_name(sp.entity_id().as_str())
            ),
        );
        let result = finish(self.kind(), result, options);

        tracing::info!(entity_id = %sp.entity_id(), "Created metadata");
        Ok(result)
    }
}

/// `https://sp.example.org:8443/saml` becomes `sp.example.org.8443_saml.xml`.
fn metadata_file_name(entity_id: &str) -> String {
    let stripped = entity_id
        .strip_prefix("https://")
        .or_else(|| entity_id.strip_prefix("http://"))
        .unwrap_or(entity_id);
    format!("{}.xml", stripped.replace(':', ".").replace('/', "_"))
}
