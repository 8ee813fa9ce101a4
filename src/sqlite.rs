//! SQLite-backed low-level dataset.
//!
//! Stores clients, videos and the protocol catalogue. Raw videos and annotation
//! files stay on disk and are located through [`StorageSettings`]. Decoding is not
//! done here: whole-video decodes go through a [`VideoDecoder`] supplied by the
//! caller.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::dataset::{
    Annotations, AttackInfo, Class, DecodeError, LowLevelDatabase, LowLevelProtocol,
    LowLevelQuery, StorageSettings, VideoRecord,
};
use crate::frame::NATIVE_VIDEO_EXTENSION;

/// Group names stored in the `clients` table.
pub const LOW_LEVEL_GROUPS: [&str; 3] = ["train", "devel", "test"];

/// Whole-video decoder used by [`SqliteVideo::load_video`].
pub trait VideoDecoder {
    fn name(&self) -> &'static str;

    /// Decodes every frame of the video at `path`, each as encoded bytes.
    fn decode(&self, path: &Path) -> std::result::Result<Vec<Vec<u8>>, DecodeError>;
}

/// Decoder used until one is installed. Always fails, never transiently.
pub struct NoDecoder;

impl VideoDecoder for NoDecoder {
    fn name(&self) -> &'static str {
        "none"
    }

    fn decode(&self, path: &Path) -> std::result::Result<Vec<Vec<u8>>, DecodeError> {
        Err(DecodeError::Other(anyhow!(
            "no video decoder configured for {}",
            path.display()
        )))
    }
}

/// Video row to insert with [`SqliteDataset::add_video`].
#[derive(Clone, Debug)]
pub struct NewVideo {
    pub path: String,
    pub client_id: String,
    pub class: Class,
    pub light: Option<String>,
    pub device: Option<String>,
    pub attack: Option<AttackInfo>,
}

pub struct SqliteDataset {
    conn: Connection,
    settings: Rc<StorageSettings>,
    decoder: Rc<dyn VideoDecoder>,
}

impl SqliteDataset {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open dataset {}", db_path))?;
        log::info!("opened replay-mobile dataset at {}", db_path);
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let dataset = Self {
            conn,
            settings: Rc::new(StorageSettings::default()),
            decoder: Rc::new(NoDecoder),
        };
        dataset.ensure_schema()?;
        Ok(dataset)
    }

    pub fn with_decoder(mut self, decoder: Rc<dyn VideoDecoder>) -> Self {
        log::debug!("using video decoder '{}'", decoder.name());
        self.decoder = decoder;
        self
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS clients (
              id TEXT PRIMARY KEY,
              grp TEXT NOT NULL CHECK (grp IN ('train', 'devel', 'test'))
            );

            CREATE TABLE IF NOT EXISTS videos (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              path TEXT NOT NULL UNIQUE,
              client_id TEXT NOT NULL REFERENCES clients(id),
              cls TEXT NOT NULL CHECK (cls IN ('enroll', 'real', 'attack')),
              light TEXT,
              device TEXT,
              attack_device TEXT,
              attack_support TEXT
            );

            CREATE TABLE IF NOT EXISTS protocols (
              name TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS protocol_videos (
              protocol TEXT NOT NULL REFERENCES protocols(name),
              video_id INTEGER NOT NULL REFERENCES videos(id),
              PRIMARY KEY (protocol, video_id)
            );

            CREATE INDEX IF NOT EXISTS idx_videos_client ON videos(client_id);
            "#,
        )?;
        Ok(())
    }

    pub fn add_client(&self, id: &str, group: &str) -> Result<()> {
        if !LOW_LEVEL_GROUPS.contains(&group) {
            return Err(anyhow!("unknown group '{}' for client {}", group, id));
        }
        self.conn.execute(
            "INSERT INTO clients(id, grp) VALUES (?1, ?2)",
            params![id, group],
        )?;
        Ok(())
    }

    pub fn add_protocol(&self, name: &str) -> Result<()> {
        self.conn
            .execute("INSERT INTO protocols(name) VALUES (?1)", params![name])?;
        Ok(())
    }

    /// Inserts a video and returns its id.
    pub fn add_video(&self, video: &NewVideo) -> Result<i64> {
        if (video.class == Class::Attack) != video.attack.is_some() {
            return Err(anyhow!(
                "video {}: attack metadata must be given exactly for attack videos",
                video.path
            ));
        }
        self.conn.execute(
            r#"
            INSERT INTO videos(path, client_id, cls, light, device, attack_device, attack_support)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                video.path,
                video.client_id,
                video.class.as_str(),
                video.light,
                video.device,
                video.attack.as_ref().map(|a| a.attack_device.as_str()),
                video.attack.as_ref().map(|a| a.attack_support.as_str()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn assign_protocol(&self, protocol: &str, video_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO protocol_videos(protocol, video_id) VALUES (?1, ?2)",
            params![protocol, video_id],
        )?;
        Ok(())
    }

    fn row_to_video(&self, row: &rusqlite::Row<'_>) -> Result<SqliteVideo> {
        let id: i64 = row.get(0)?;
        let class: String = row.get(3)?;
        let class: Class = class.parse()?;
        let attack_device: Option<String> = row.get(4)?;
        let attack_support: Option<String> = row.get(5)?;
        let attack = match (class, attack_device, attack_support) {
            (Class::Attack, Some(attack_device), Some(attack_support)) => Some(AttackInfo {
                attack_device,
                attack_support,
            }),
            (Class::Attack, _, _) => {
                return Err(anyhow!("corrupt dataset: attack video {} lacks metadata", id))
            }
            _ => None,
        };
        Ok(SqliteVideo {
            id,
            path: row.get(1)?,
            client_id: row.get(2)?,
            class,
            attack,
            settings: Rc::clone(&self.settings),
            decoder: Rc::clone(&self.decoder),
        })
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl LowLevelDatabase for SqliteDataset {
    type Record = SqliteVideo;

    fn objects(&self, query: &LowLevelQuery) -> Result<Vec<SqliteVideo>> {
        let mut sql = String::from(
            r#"
            SELECT v.id, v.path, v.client_id, v.cls, v.attack_device, v.attack_support
            FROM videos v JOIN clients c ON c.id = v.client_id
            WHERE (v.cls = 'enroll'
                   OR v.id IN (SELECT video_id FROM protocol_videos WHERE protocol = ?))
            "#,
        );
        let mut args: Vec<String> = vec![query.protocol.clone()];

        let mut restrict = |column: &str, values: &[String]| {
            if values.is_empty() {
                return;
            }
            sql.push_str(&format!(" AND {} IN ({})", column, placeholders(values.len())));
            args.extend(values.iter().cloned());
        };

        restrict("c.grp", &query.groups[..]);
        let classes: Vec<String> = query.classes.iter().map(|c| c.to_string()).collect();
        restrict("v.cls", &classes[..]);
        if let Some(clients) = &query.clients {
            restrict("v.client_id", &clients[..]);
        }
        for (key, values) in query.filters.iter() {
            let column = match key {
                "light" => "v.light",
                "device" => "v.device",
                "support" => "v.attack_support",
                other => return Err(anyhow!("unsupported filter '{}'", other)),
            };
            restrict(column, values);
        }
        sql.push_str(" ORDER BY v.id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(self.row_to_video(row)?);
        }
        Ok(out)
    }

    fn clients(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM clients ORDER BY id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn has_client_id(&self, id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM clients WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn protocols(&self) -> Result<Vec<LowLevelProtocol>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM protocols ORDER BY rowid ASC")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names
            .into_iter()
            .map(|name| LowLevelProtocol { name })
            .collect())
    }

    fn groups(&self) -> Result<Vec<String>> {
        Ok(LOW_LEVEL_GROUPS.iter().map(|g| g.to_string()).collect())
    }

    fn configure(&mut self, settings: &StorageSettings) -> Result<()> {
        self.settings = Rc::new(settings.clone());
        Ok(())
    }
}

/// Video row returned by [`SqliteDataset`].
pub struct SqliteVideo {
    id: i64,
    path: String,
    client_id: String,
    class: Class,
    attack: Option<AttackInfo>,
    settings: Rc<StorageSettings>,
    decoder: Rc<dyn VideoDecoder>,
}

impl SqliteVideo {
    /// `directory/<path><extension>`, defaulting to the configured original location.
    pub fn video_file(&self, directory: Option<&Path>, extension: Option<&str>) -> PathBuf {
        let extension = extension
            .or(self.settings.original_extension.as_deref())
            .unwrap_or(NATIVE_VIDEO_EXTENSION);
        let file_name = format!("{}{}", self.path, extension);
        match directory.or(self.settings.original_directory.as_deref()) {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    fn annotation_file(&self) -> Result<PathBuf> {
        let dir = self
            .settings
            .annotation_directory
            .as_deref()
            .ok_or_else(|| anyhow!("no annotation directory configured"))?;
        Ok(dir.join(format!(
            "{}{}",
            self.path, self.settings.annotation_extension
        )))
    }
}

impl VideoRecord for SqliteVideo {
    type Frame = Vec<u8>;

    fn id(&self) -> i64 {
        self.id
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn class(&self) -> Class {
        self.class
    }

    fn attack(&self) -> Result<AttackInfo> {
        self.attack
            .clone()
            .ok_or_else(|| anyhow!("video {} is not an attack", self.path))
    }

    fn annotations(&self) -> Result<Annotations> {
        let path = self.annotation_file()?;
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read annotations {}", path.display()))?;
        let annotations = serde_json::from_str(&raw)
            .with_context(|| format!("invalid annotations {}", path.display()))?;
        Ok(annotations)
    }

    fn load_video(
        &self,
        directory: Option<&Path>,
        extension: Option<&str>,
    ) -> std::result::Result<Vec<Vec<u8>>, DecodeError> {
        self.decoder.decode(&self.video_file(directory, extension))
    }

    fn load_resource(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }
}
