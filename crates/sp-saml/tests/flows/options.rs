//! Per-partner SP options and the frozen signing identity.

use std::sync::Arc;

use sp_saml::options::IdentityBinding;
use sp_saml::signature::SigningCredential;
use sp_saml::{IdentityProvider, PartnerRegistry, SpOptions, resolve_sp_options};

use crate::common::{SP_CERT, SP_ENTITY, SP_KEY, entity, sp_options};

fn tenant_options(entity_id: &str) -> anyhow::Result<Arc<SpOptions>> {
    Ok(Arc::new(
        SpOptions::builder(entity(entity_id)?)
            .signing_credential(SigningCredential::from_pem(SP_KEY, SP_CERT)?)
            .build()?,
    ))
}

fn registry_with(options: Arc<SpOptions>) -> anyhow::Result<PartnerRegistry> {
    let partner = IdentityProvider::new(entity(SP_ENTITY)?, "https://idp.example.com/sso")
        .with_sp_options(options);
    Ok(PartnerRegistry::with_partners([partner]))
}

#[test]
fn unbound_override_acts_as_the_requested_identity() -> anyhow::Result<()> {
    let static_options = Arc::new(sp_options()?);
    let tenant = tenant_options("https://tenant.example.org/")?;
    let registry = registry_with(Arc::clone(&tenant))?;

    let resolved = resolve_sp_options(&static_options, &registry, &entity(SP_ENTITY)?);

    assert!(!Arc::ptr_eq(&resolved, &static_options));
    assert_eq!(resolved.entity_id().as_str(), SP_ENTITY);

    resolved.signer()?;
    assert_eq!(tenant.identity(), IdentityBinding::Bound(entity(SP_ENTITY)?));
    Ok(())
}

#[test]
fn override_bound_elsewhere_falls_back_to_static_options() -> anyhow::Result<()> {
    let static_options = Arc::new(sp_options()?);
    let tenant = tenant_options("https://tenant.example.org/")?;
    tenant.signer()?;
    let registry = registry_with(tenant)?;

    let resolved = resolve_sp_options(&static_options, &registry, &entity(SP_ENTITY)?);

    assert!(Arc::ptr_eq(&resolved, &static_options));
    Ok(())
}

#[test]
fn signer_refuses_a_second_identity() -> anyhow::Result<()> {
    let tenant = tenant_options("https://tenant.example.org/")?;
    tenant.signer()?;

    let err = tenant.rebind(entity("https://other.example.org/")?).unwrap_err();
    assert_eq!(err.bound, entity("https://tenant.example.org/")?);

    let same = tenant.rebind(entity("https://tenant.example.org/")?)?;
    same.signer()?;
    Ok(())
}
