use crate::error::{AppError, AppResult};
use crate::gateway::{AuthMethod, ConnectParams, Protocol};
use crate::logging::{self, LogLevel, LogSubsystem};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Connection profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub protocol: Protocol,
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub last_used: Option<i64>,
}

fn default_port() -> u16 {
    22
}

impl Profile {
    pub fn new(name: String, host: String, username: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            host,
            port: 22,
            username,
            protocol: Protocol::Ssh,
            auth_method: AuthMethod::Agent,
            created_at: now,
            updated_at: now,
            last_used: None,
        }
    }

    /// Check required fields, reporting every bad field at once
    pub fn validate(&self) -> AppResult<()> {
        let mut fields = Vec::new();
        if self.name.trim().is_empty() {
            fields.push("name");
        }
        if self.host.trim().is_empty() {
            fields.push("host");
        }
        if self.port == 0 {
            fields.push("port");
        }
        if self.username.trim().is_empty() {
            fields.push("username");
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation {
                fields: fields.into_iter().map(String::from).collect(),
            })
        }
    }

    /// Snapshot the connection parameters for a new session instance
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            protocol: self.protocol,
            auth_method: self.auth_method.clone(),
        }
    }
}

/// Profile file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Profile manager
pub struct ProfileManager {
    profiles: Vec<Profile>,
    config_path: PathBuf,
}

impl ProfileManager {
    pub fn load(config_dir: &Path) -> AppResult<Self> {
        Self::with_path(config_dir.join("profiles.toml"))
    }

    /// Load from an explicit file path
    pub fn with_path(config_path: PathBuf) -> AppResult<Self> {
        let profiles = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let file: ProfilesFile = toml::from_str(&content)?;
            file.profiles
        } else {
            Vec::new()
        };

        Ok(Self {
            profiles,
            config_path,
        })
    }

    pub fn save(&self) -> AppResult<()> {
        let file = ProfilesFile {
            profiles: self.profiles.clone(),
        };
        let content = toml::to_string_pretty(&file)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// All profiles in creation order
    pub fn list(&self) -> Vec<Profile> {
        self.profiles.clone()
    }

    pub fn get(&self, id: &str) -> Option<Profile> {
        self.profiles.iter().find(|p| p.id == id).cloned()
    }

    pub fn create(&mut self, profile: Profile) -> AppResult<Profile> {
        profile.validate()?;
        if self.get(&profile.id).is_some() {
            return Err(AppError::Config(format!(
                "Profile {} already exists",
                profile.id
            )));
        }
        self.profiles.push(profile.clone());
        self.save()?;
        logging::log(
            LogLevel::Info,
            LogSubsystem::Config,
            format!("Created profile {}", profile.name),
        );
        Ok(profile)
    }

    pub fn update(&mut self, profile: Profile) -> AppResult<Profile> {
        profile.validate()?;
        let pos = self
            .profiles
            .iter()
            .position(|p| p.id == profile.id)
            .ok_or_else(|| AppError::ProfileNotFound(profile.id.clone()))?;

        let mut updated = profile;
        updated.created_at = self.profiles[pos].created_at;
        updated.last_used = self.profiles[pos].last_used;
        updated.updated_at = chrono::Utc::now().timestamp();
        self.profiles[pos] = updated.clone();
        self.save()?;
        logging::log(
            LogLevel::Info,
            LogSubsystem::Config,
            format!("Updated profile {}", updated.name),
        );
        Ok(updated)
    }

    pub fn delete(&mut self, id: &str) -> AppResult<()> {
        let pos = self
            .profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| AppError::ProfileNotFound(id.to_string()))?;
        let removed = self.profiles.remove(pos);
        self.save()?;
        logging::log(
            LogLevel::Info,
            LogSubsystem::Config,
            format!("Deleted profile {}", removed.name),
        );
        Ok(())
    }

    /// Stamp a profile as just used
    pub fn touch(&mut self, id: &str) -> AppResult<()> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::ProfileNotFound(id.to_string()))?;
        profile.last_used = Some(chrono::Utc::now().timestamp());
        self.save()
    }
}
