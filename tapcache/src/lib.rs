//! Module de gestion de la base de données SQLite du cache de pistes
//!
//! Ce module fournit la persistance locale du pipeline :
//! - l'index des pistes déjà téléversées (clé de cache → identifiant distant)
//! - les identifiants d'accès scrappés des fournisseurs, avec leur date de
//!   rafraîchissement
//!
//! Les deux tables vivent dans le même fichier SQLite, derrière une
//! connexion unique protégée par un mutex.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

// Réexporté pour que les appelants puissent nommer les erreurs sans
// dépendre directement de rusqlite
pub use rusqlite;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

/// Entrée de l'index des pistes
///
/// Associe la clé de cache durable d'une piste (namespacée par fournisseur)
/// à l'identifiant du fichier déjà téléversé dans le stockage distant.
#[derive(Debug, Serialize, Clone)]
pub struct TrackRecord {
    /// Clé de cache de la piste (`{provider}:{canonical_id}`)
    pub cache_key: String,
    /// Fournisseur de la piste
    pub provider: String,
    /// Identifiant canonique attribué par le fournisseur
    pub canonical_id: String,
    /// Identifiant du fichier dans le stockage distant
    pub file_id: String,
    /// Nom de fichier d'affichage
    pub filename: String,
    /// Nombre d'accès au cache pour cette piste
    pub hits: i32,
    /// Date/heure de création de l'entrée (RFC3339)
    pub created_at: Option<String>,
    /// Date/heure du dernier accès (RFC3339)
    pub last_used: Option<String>,
}

/// Identifiant d'accès persisté pour un fournisseur
#[derive(Debug, Clone)]
pub struct StoredCredential {
    /// Valeur de l'identifiant (ex: client_id SoundCloud)
    pub value: String,
    /// Date/heure du dernier rafraîchissement
    pub refreshed_at: DateTime<Utc>,
}

/// Base de données SQLite du cache
///
/// Gère les deux tables persistantes du pipeline :
/// - `tracks` : index clé de cache → fichier distant
/// - `credentials` : identifiants d'accès par fournisseur
#[derive(Debug)]
pub struct CacheDb {
    conn: Mutex<Connection>,
}

impl CacheDb {
    /// Initialise la base de données et crée les tables si nécessaire
    ///
    /// # Arguments
    ///
    /// * `path` - Chemin vers le fichier de base de données SQLite
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// use tapcache::CacheDb;
    /// use std::path::Path;
    ///
    /// let db = CacheDb::init(Path::new("tapmusic.sqlite3")).unwrap();
    /// ```
    pub fn init(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        // La clé primaire sur cache_key garantit une entrée unique par
        // piste : un doublon est un bug d'appelant, pas un état valide.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tracks (
                cache_key TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                canonical_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                filename TEXT,
                hits INTEGER DEFAULT 0,
                created_at TEXT,
                last_used TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tracks_provider ON tracks (provider)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS credentials (
                provider TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                refreshed_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ajoute ou met à jour une entrée dans l'index des pistes
    ///
    /// En cas de conflit sur la clé de cache, l'entrée existante est mise à
    /// jour avec le nouvel identifiant de fichier. L'ancien objet distant
    /// n'est pas supprimé ici : l'appelant doit journaliser la fuite.
    ///
    /// # Arguments
    ///
    /// * `cache_key` - Clé de cache de la piste
    /// * `provider` - Nom du fournisseur
    /// * `canonical_id` - Identifiant canonique de la piste
    /// * `file_id` - Identifiant du fichier dans le stockage distant
    /// * `filename` - Nom de fichier d'affichage
    pub fn record_track(
        &self,
        cache_key: &str,
        provider: &str,
        canonical_id: &str,
        file_id: &str,
        filename: &str,
    ) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO tracks (cache_key, provider, canonical_id, file_id, filename, hits, created_at, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
             ON CONFLICT(cache_key) DO UPDATE SET
                 file_id = excluded.file_id,
                 filename = excluded.filename,
                 last_used = excluded.last_used",
            params![cache_key, provider, canonical_id, file_id, filename, now],
        )?;

        Ok(())
    }

    /// Recherche une piste dans l'index par sa clé de cache
    ///
    /// Retourne `None` si la piste n'a jamais été téléversée.
    pub fn lookup_track(&self, cache_key: &str) -> rusqlite::Result<Option<TrackRecord>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT cache_key, provider, canonical_id, file_id, filename, hits, created_at, last_used
             FROM tracks WHERE cache_key = ?1",
            [cache_key],
            |row| {
                Ok(TrackRecord {
                    cache_key: row.get(0)?,
                    provider: row.get(1)?,
                    canonical_id: row.get(2)?,
                    file_id: row.get(3)?,
                    filename: row.get(4)?,
                    hits: row.get(5)?,
                    created_at: row.get(6)?,
                    last_used: row.get(7)?,
                })
            },
        )
        .optional()
    }

    /// Met à jour le compteur d'accès et la date du dernier accès d'une piste
    pub fn track_hit(&self, cache_key: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "UPDATE tracks SET hits = hits + 1, last_used = ?1 WHERE cache_key = ?2",
            params![Utc::now().to_rfc3339(), cache_key],
        )?;

        Ok(())
    }

    /// Supprime une piste de l'index
    ///
    /// Utilisé quand l'objet distant a disparu et que l'entrée est périmée.
    pub fn remove_track(&self, cache_key: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM tracks WHERE cache_key = ?1", [cache_key])?;
        Ok(())
    }

    /// Récupère toutes les pistes, triées par nombre d'accès décroissant
    pub fn all_tracks(&self) -> rusqlite::Result<Vec<TrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT cache_key, provider, canonical_id, file_id, filename, hits, created_at, last_used
             FROM tracks ORDER BY hits DESC",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(TrackRecord {
                    cache_key: row.get(0)?,
                    provider: row.get(1)?,
                    canonical_id: row.get(2)?,
                    file_id: row.get(3)?,
                    filename: row.get(4)?,
                    hits: row.get(5)?,
                    created_at: row.get(6)?,
                    last_used: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Purge toutes les entrées de l'index des pistes
    pub fn purge_tracks(&self) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM tracks", [])?;
        Ok(())
    }

    /// Charge l'identifiant d'accès persisté d'un fournisseur
    ///
    /// Retourne `None` si aucun identifiant n'a encore été persisté, ou si
    /// la date de rafraîchissement stockée est illisible (l'entrée est alors
    /// considérée comme absente et sera réécrite au prochain rafraîchissement).
    pub fn load_credential(&self, provider: &str) -> rusqlite::Result<Option<StoredCredential>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT value, refreshed_at FROM credentials WHERE provider = ?1",
                [provider],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((value, refreshed_at)) = row else {
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(&refreshed_at) {
            Ok(ts) => Ok(Some(StoredCredential {
                value,
                refreshed_at: ts.with_timezone(&Utc),
            })),
            Err(e) => {
                tracing::warn!(
                    "Unreadable refreshed_at for provider {}: {} - treating credential as absent",
                    provider,
                    e
                );
                Ok(None)
            }
        }
    }

    /// Persiste l'identifiant d'accès d'un fournisseur
    ///
    /// La date de rafraîchissement est fixée à l'instant de l'appel.
    pub fn store_credential(&self, provider: &str, value: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO credentials (provider, value, refreshed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(provider) DO UPDATE SET
                 value = excluded.value,
                 refreshed_at = excluded.refreshed_at",
            params![provider, value, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }
}
