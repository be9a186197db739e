//! Implémentation S3 du dépôt d'objets distant
//!
//! Compatible AWS S3 et serveurs alternatifs (MinIO, Garage) via un endpoint
//! personnalisé. Les objets sont adressés par un identifiant opaque (UUID v4)
//! généré au téléversement ; le nom de fichier d'affichage voyage dans les
//! métadonnées de l'objet.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{RemoteStore, Result, StoreError, StoredObject};

/// Configuration du dépôt S3
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    /// Nom du bucket cible
    pub bucket: String,
    /// Région AWS (ignorée par la plupart des serveurs alternatifs)
    pub region: String,
    /// Préfixe des clés d'objets (ex: "tracks")
    pub prefix: String,
    /// Endpoint personnalisé, pour un serveur S3 alternatif
    pub endpoint: Option<String>,
    /// Identifiant d'accès
    pub access_key_id: String,
    /// Clé secrète
    pub secret_access_key: String,
}

impl S3StoreConfig {
    /// Valide la configuration avant la construction du client
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(StoreError::Config("Bucket name cannot be empty".to_string()));
        }
        if self.access_key_id.trim().is_empty() {
            return Err(StoreError::Config("Access key ID cannot be empty".to_string()));
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(StoreError::Config(
                "Secret access key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dépôt d'objets S3
pub struct S3RemoteStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3RemoteStore {
    /// Construit le client S3 à partir de la configuration
    pub async fn new(config: S3StoreConfig) -> Result<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "tapstore-s3-config",
        );

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            let normalized_endpoint = endpoint.trim_end_matches('/').to_string();
            info!("Using custom S3 endpoint: {}", normalized_endpoint);
            aws_config_builder = aws_config_builder.endpoint_url(normalized_endpoint);
        } else {
            info!("Using default AWS S3 endpoint");
        }

        let aws_config = aws_config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket,
            prefix: config.prefix,
        })
    }

    fn object_key(&self, file_id: &str) -> String {
        if self.prefix.is_empty() {
            file_id.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), file_id)
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for S3RemoteStore {
    async fn put(&self, filename: &str, data: &[u8]) -> Result<String> {
        let file_id = Uuid::new_v4().to_string();
        let key = self.object_key(&file_id);

        debug!("Uploading {} as {} ({} bytes)", filename, key, data.len());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(data.to_vec().into())
            .content_type("audio/mpeg")
            .metadata("filename", filename)
            .send()
            .await
            .map_err(|e| StoreError::Storage(format!("Put object failed: {}", e)))?;

        debug!("Successfully uploaded s3://{}/{}", self.bucket, key);
        Ok(file_id)
    }

    async fn get(&self, file_id: &str) -> Result<StoredObject> {
        let key = self.object_key(file_id);

        debug!("Downloading s3://{}/{}", self.bucket, key);
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    StoreError::NotFound(file_id.to_string())
                } else {
                    StoreError::Storage(format!("Get object failed: {}", service_error))
                }
            })?;

        let filename = response
            .metadata()
            .and_then(|m| m.get("filename"))
            .cloned()
            .unwrap_or_else(|| format!("{}.mp3", file_id));

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Storage(format!("Body read failed: {}", e)))?
            .into_bytes()
            .to_vec();

        debug!("Successfully downloaded {} bytes", data.len());
        Ok(StoredObject { data, filename })
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let key = self.object_key(file_id);

        debug!("Deleting s3://{}/{}", self.bucket, key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StoreError::Storage(format!("Delete object failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3StoreConfig {
        S3StoreConfig {
            bucket: "tracks".to_string(),
            region: "us-east-1".to_string(),
            prefix: "tracks".to_string(),
            endpoint: None,
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
        }
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let mut cfg = config();
        cfg.bucket = "".to_string();
        assert!(matches!(cfg.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_missing_keys() {
        let mut cfg = config();
        cfg.access_key_id = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(StoreError::Config(_))));

        let mut cfg = config();
        cfg.secret_access_key = "".to_string();
        assert!(matches!(cfg.validate(), Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_object_key_prefixing() {
        let store = S3RemoteStore::new(config()).await.unwrap();
        assert_eq!(store.object_key("abc"), "tracks/abc");

        let mut cfg = config();
        cfg.prefix = "".to_string();
        let store = S3RemoteStore::new(cfg).await.unwrap();
        assert_eq!(store.object_key("abc"), "abc");

        let mut cfg = config();
        cfg.prefix = "tracks/".to_string();
        let store = S3RemoteStore::new(cfg).await.unwrap();
        assert_eq!(store.object_key("abc"), "tracks/abc");
    }
}
