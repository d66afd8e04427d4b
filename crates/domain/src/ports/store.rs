use crate::DomainResult;
use crate::document::EditDocument;
use crate::ports::BoxFuture;

/// External persistence collaborator. The serialization unit is the full
/// document, version chain and comment set included; a saved document must
/// round-trip losslessly through `save`/`load`.
pub trait DocumentRepository: Send + Sync {
    fn save(&self, document: &EditDocument) -> BoxFuture<'_, DomainResult<()>>;

    fn load(&self, document_id: &str) -> BoxFuture<'_, DomainResult<Option<EditDocument>>>;

    fn list_ids(&self) -> BoxFuture<'_, DomainResult<Vec<String>>>;
}
