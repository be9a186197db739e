//! Extension pour intégrer la configuration du stockage dans tapconfig
//!
//! Ce module fournit le trait `StoreConfigExt` qui ajoute les accesseurs du
//! dépôt S3 à `tapconfig::Config`.

use anyhow::{anyhow, Result};
use serde_yaml::Value;
use tapconfig::Config;

use crate::S3StoreConfig;

/// Trait d'extension pour la configuration du stockage distant
///
/// # Exemple
///
/// ```rust,ignore
/// use tapconfig::get_config;
/// use tapstore::StoreConfigExt;
///
/// let config = get_config();
/// let s3 = config.get_store_config()?;
/// println!("Bucket: {}", s3.bucket);
/// ```
pub trait StoreConfigExt {
    /// Récupère le nom du bucket cible
    ///
    /// # Errors
    ///
    /// Retourne une erreur si le bucket n'est pas configuré
    fn get_store_bucket(&self) -> Result<String>;

    /// Définit le nom du bucket cible
    fn set_store_bucket(&self, bucket: &str) -> Result<()>;

    /// Récupère la région S3 (défaut: "us-east-1")
    fn get_store_region(&self) -> String;

    /// Récupère le préfixe des clés d'objets (défaut: "tracks")
    fn get_store_prefix(&self) -> String;

    /// Récupère l'endpoint personnalisé, ou None pour AWS
    fn get_store_endpoint(&self) -> Option<String>;

    /// Récupère les identifiants d'accès (access_key_id, secret_access_key)
    ///
    /// # Errors
    ///
    /// Retourne une erreur si l'un des deux n'est pas configuré
    fn get_store_credentials(&self) -> Result<(String, String)>;

    /// Assemble la configuration S3 complète du dépôt
    fn get_store_config(&self) -> Result<S3StoreConfig>;
}

impl StoreConfigExt for Config {
    fn get_store_bucket(&self) -> Result<String> {
        self.get_string(&["storage", "bucket"])
            .ok_or_else(|| anyhow!("Storage bucket not configured"))
    }

    fn set_store_bucket(&self, bucket: &str) -> Result<()> {
        self.set_value(&["storage", "bucket"], Value::String(bucket.to_string()))
    }

    fn get_store_region(&self) -> String {
        self.get_string(&["storage", "region"])
            .unwrap_or_else(|| "us-east-1".to_string())
    }

    fn get_store_prefix(&self) -> String {
        self.get_string(&["storage", "prefix"])
            .unwrap_or_else(|| "tracks".to_string())
    }

    fn get_store_endpoint(&self) -> Option<String> {
        self.get_string(&["storage", "endpoint"])
    }

    fn get_store_credentials(&self) -> Result<(String, String)> {
        let access_key_id = self
            .get_string(&["storage", "access_key_id"])
            .ok_or_else(|| anyhow!("Storage access key ID not configured"))?;
        let secret_access_key = self
            .get_string(&["storage", "secret_access_key"])
            .ok_or_else(|| anyhow!("Storage secret access key not configured"))?;
        Ok((access_key_id, secret_access_key))
    }

    fn get_store_config(&self) -> Result<S3StoreConfig> {
        let bucket = self.get_store_bucket()?;
        let (access_key_id, secret_access_key) = self.get_store_credentials()?;

        Ok(S3StoreConfig {
            bucket,
            region: self.get_store_region(),
            prefix: self.get_store_prefix(),
            endpoint: self.get_store_endpoint(),
            access_key_id,
            secret_access_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unconfigured_bucket_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        assert!(config.get_store_bucket().is_err());
        assert!(config.get_store_config().is_err());
    }

    #[test]
    fn test_defaults_and_configured_values() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        assert_eq!(config.get_store_region(), "us-east-1");
        assert_eq!(config.get_store_prefix(), "tracks");
        assert!(config.get_store_endpoint().is_none());

        config.set_store_bucket("my-tracks").unwrap();
        config
            .set_value(
                &["storage", "access_key_id"],
                Value::String("AKIA".to_string()),
            )
            .unwrap();
        config
            .set_value(
                &["storage", "secret_access_key"],
                Value::String("secret".to_string()),
            )
            .unwrap();

        let s3 = config.get_store_config().unwrap();
        assert_eq!(s3.bucket, "my-tracks");
        assert_eq!(s3.access_key_id, "AKIA");
        assert_eq!(s3.secret_access_key, "secret");
    }
}
