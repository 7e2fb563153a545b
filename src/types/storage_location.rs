use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageLocation {
    Downloads,
    MyFiles,
    DriveFsMyDrive,
    DriveFsTeamDrives,
    DriveFsComputers,
    Removable,
    PlayFiles,
    /// Anything a client sent that we don't recognize. Kept around instead of
    /// failing deserialization so the request gets a precise failure reason.
    Unknown(String),
}

impl StorageLocation {
    pub fn as_str(&self) -> &str {
        match self {
            StorageLocation::Downloads => "DOWNLOADS",
            StorageLocation::MyFiles => "MY_FILES",
            StorageLocation::DriveFsMyDrive => "DRIVEFS_MY_DRIVE",
            StorageLocation::DriveFsTeamDrives => "DRIVEFS_TEAM_DRIVES",
            StorageLocation::DriveFsComputers => "DRIVEFS_COMPUTERS",
            StorageLocation::Removable => "REMOVABLE",
            StorageLocation::PlayFiles => "PLAY_FILES",
            StorageLocation::Unknown(name) => name.as_str(),
        }
    }

    pub fn requires_owner_id(&self) -> bool {
        matches!(self, StorageLocation::Downloads | StorageLocation::MyFiles)
    }

    pub fn requires_drivefs_mount_name(&self) -> bool {
        matches!(
            self,
            StorageLocation::DriveFsMyDrive
                | StorageLocation::DriveFsTeamDrives
                | StorageLocation::DriveFsComputers
        )
    }
}

impl From<String> for StorageLocation {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "DOWNLOADS" => StorageLocation::Downloads,
            "MY_FILES" => StorageLocation::MyFiles,
            "DRIVEFS_MY_DRIVE" => StorageLocation::DriveFsMyDrive,
            "DRIVEFS_TEAM_DRIVES" => StorageLocation::DriveFsTeamDrives,
            "DRIVEFS_COMPUTERS" => StorageLocation::DriveFsComputers,
            "REMOVABLE" => StorageLocation::Removable,
            "PLAY_FILES" => StorageLocation::PlayFiles,
            _ => StorageLocation::Unknown(s),
        }
    }
}

impl From<StorageLocation> for String {
    fn from(location: StorageLocation) -> Self {
        location.as_str().to_string()
    }
}

impl FromStr for StorageLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match StorageLocation::from(s.to_string()) {
            StorageLocation::Unknown(s) => {
                Err(format!("Invalid storage location: {}", s))
            }
            location => Ok(location),
        }
    }
}

impl Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_location_survives_deserialization() {
        let location: StorageLocation =
            serde_json::from_str("\"FLOPPY\"").unwrap();
        assert_eq!(location, StorageLocation::Unknown("FLOPPY".to_string()));
        assert!("FLOPPY".parse::<StorageLocation>().is_err());
    }

    #[test]
    fn test_cli_spelling() {
        assert_eq!(
            "drivefs-my-drive".parse::<StorageLocation>(),
            Ok(StorageLocation::DriveFsMyDrive)
        );
        assert_eq!(
            serde_json::to_string(&StorageLocation::PlayFiles).unwrap(),
            "\"PLAY_FILES\""
        );
    }
}
