//! # TAPStore
//!
//! Stockage distant des pistes audio pour TAPMusic.
//!
//! Ce crate définit le trait [`RemoteStore`] (le dépôt d'objets où finissent
//! les MP3 étiquetés) et son implémentation S3 [`S3RemoteStore`], compatible
//! avec AWS et les serveurs S3 alternatifs (MinIO, etc.) via un endpoint
//! personnalisé.
//!
//! L'identifiant de fichier (`file_id`) est opaque pour les appelants : il
//! est généré au téléversement et c'est lui, et lui seul, qui est persisté
//! dans l'index des pistes.

mod config_ext;
mod s3;

pub use config_ext::StoreConfigExt;
pub use s3::{S3RemoteStore, S3StoreConfig};

/// Erreurs du stockage distant
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// L'objet demandé n'existe pas (entrée d'index périmée)
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Échec de communication avec le dépôt
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration du dépôt invalide ou incomplète
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type pour les opérations de stockage
pub type Result<T> = std::result::Result<T, StoreError>;

/// Objet récupéré du stockage distant
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Contenu binaire de l'objet
    pub data: Vec<u8>,
    /// Nom de fichier d'affichage attaché à l'objet
    pub filename: String,
}

/// Trait du dépôt d'objets distant
///
/// Les implémentations doivent être `Send + Sync` pour un usage concurrent.
/// Les tests du pipeline utilisent un double en mémoire de ce trait.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Téléverse un objet et retourne son identifiant de fichier opaque
    ///
    /// # Arguments
    ///
    /// * `filename` - Nom de fichier d'affichage, attaché à l'objet
    /// * `data` - Contenu binaire à téléverser
    async fn put(&self, filename: &str, data: &[u8]) -> Result<String>;

    /// Récupère un objet par son identifiant de fichier
    ///
    /// # Errors
    ///
    /// * `StoreError::NotFound` - l'objet a disparu du dépôt
    async fn get(&self, file_id: &str) -> Result<StoredObject>;

    /// Supprime un objet du dépôt
    async fn delete(&self, file_id: &str) -> Result<()>;
}
