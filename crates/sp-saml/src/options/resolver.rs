//! Effective SP options per exchange.

use std::sync::Arc;

use super::{PartnerRegistry, SpOptions};
use crate::entity_id::EntityId;

/// Returns the SP options to use for an exchange under `entity_id`.
///
/// A registry entry for `entity_id` carrying its own SP options wins, acting
/// as `entity_id`. If those options are already bound to another identity
/// the static options are used instead. This function never fails.
#[must_use]
pub fn resolve_sp_options(
    static_options: &Arc<SpOptions>,
    registry: &PartnerRegistry,
    entity_id: &EntityId,
) -> Arc<SpOptions> {
    let Some(overridden) = registry
        .get(entity_id.as_str())
        .and_then(|idp| idp.sp_options.clone())
    else {
        return Arc::clone(static_options);
    };

    match overridden.rebind(entity_id.clone()) {
        Ok(options) => {
            tracing::debug!(%entity_id, "Using per-partner SP options");
            Arc::new(options)
        }
        Err(conflict) => {
            tracing::error!(
                %entity_id,
                error = %conflict,
                "Token handler already instantiated on IdentityProvider. Falling back to original SPOptions."
            );
            Arc::clone(static_options)
        }
    }
}
