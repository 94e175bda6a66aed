//! Resolves a signature's `keyId` to a [`CryptographicKey`] by fetching the
//! owning actor document and reading its `publicKey` property — the only
//! key-discovery mechanism this workspace supports (no standalone key
//! documents).

use apfed_core::{ClassTag, CryptographicKey, Node};
use apfed_error::Result;
use apfed_sig::KeyResolver;
use apfed_vocab::{from_json_ld_as, DocumentLoader};
use async_trait::async_trait;
use serde_json::Value;

pub struct ActorKeyResolver<'a> {
    loader: &'a dyn DocumentLoader,
}

impl<'a> ActorKeyResolver<'a> {
    pub fn new(loader: &'a dyn DocumentLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl KeyResolver for ActorKeyResolver<'_> {
    async fn resolve_key(&self, key_id: &str) -> Result<Option<CryptographicKey>> {
        let base = key_id.split('#').next().unwrap_or(key_id);
        let document: Value = self.loader.load(base).await?;
        let actor = from_json_ld_as(&document, ClassTag::Actor)?;
        Ok(collect_keys(&actor).into_iter().find(|k| k.id == key_id))
    }
}

fn collect_keys(actor: &Node) -> Vec<CryptographicKey> {
    actor
        .get("publicKey")
        .map(|slot| slot.all().into_iter().filter_map(|v| v.as_parsed()).filter_map(node_to_key).collect())
        .unwrap_or_default()
}

fn node_to_key(node: &Node) -> Option<CryptographicKey> {
    let id = node.id.clone()?;
    let public_key_pem = match node.get("publicKeyPem")?.first()? {
        apfed_core::PropertyValue::Scalar(Value::String(s)) => s.clone(),
        _ => return None,
    };
    let owner = node
        .get("owner")
        .and_then(|slot| slot.first())
        .and_then(|v| v.id_only())
        .map(str::to_string);
    Some(CryptographicKey {
        id,
        public_key_pem,
        owner,
    })
}
