use super::path_validator::is_single_component;
use crate::config::StorageRoots;
use crate::types::StorageLocation;
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

pub const DRIVEFS_MOUNT_PREFIX: &str = "drivefs-";

/// Where a share comes from on the host and where it lands inside fsroot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPlan {
    pub source: PathBuf,
    /// Relative to the server's fsroot.
    pub destination: PathBuf,
}

/**
 * Resolves a storage location plus an already validated relative path into a
 * host source and an fsroot relative destination.
 *
 * Only the `root`, `team_drives` and `Computers` directories of a DriveFS
 * mount are ever used as prefixes, so nothing shared from DriveFS can reach
 * its `.Trash`.
 */
pub fn plan_mount(
    roots: &StorageRoots,
    location: &StorageLocation,
    owner_id: &str,
    drivefs_mount_name: &str,
    path: &Path,
) -> Result<MountPlan> {
    if location.requires_owner_id() && !is_single_component(owner_id) {
        return Err(anyhow!("owner_id must be a single valid component"));
    }
    if location.requires_drivefs_mount_name()
        && !(is_single_component(drivefs_mount_name)
            && drivefs_mount_name.starts_with(DRIVEFS_MOUNT_PREFIX))
    {
        return Err(anyhow!(
            "drivefs_mount_name must be a single valid component"
        ));
    }

    let (source, destination) = match location {
        StorageLocation::Downloads => (
            roots.home_dir.join(owner_id).join("Downloads"),
            PathBuf::from("MyFiles/Downloads"),
        ),
        StorageLocation::MyFiles => (
            roots.home_dir.join(owner_id).join("MyFiles"),
            PathBuf::from("MyFiles"),
        ),
        StorageLocation::DriveFsMyDrive => (
            roots.drivefs_dir.join(drivefs_mount_name).join("root"),
            PathBuf::from("GoogleDrive/MyDrive"),
        ),
        StorageLocation::DriveFsTeamDrives => (
            roots.drivefs_dir.join(drivefs_mount_name).join("team_drives"),
            PathBuf::from("GoogleDrive/TeamDrives"),
        ),
        StorageLocation::DriveFsComputers => (
            roots.drivefs_dir.join(drivefs_mount_name).join("Computers"),
            PathBuf::from("GoogleDrive/Computers"),
        ),
        StorageLocation::Removable => {
            (roots.removable_dir.clone(), PathBuf::from("removable"))
        }
        StorageLocation::PlayFiles => {
            (roots.play_files_dir.clone(), PathBuf::from("PlayFiles"))
        }
        StorageLocation::Unknown(_) => {
            return Err(anyhow!("Unknown storage location"));
        }
    };

    let plan = if path.as_os_str().is_empty() {
        MountPlan {
            source,
            destination,
        }
    } else {
        MountPlan {
            source: source.join(path),
            destination: destination.join(path),
        }
    };

    if !plan.source.exists() {
        return Err(anyhow!("Requested path does not exist"));
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(base: &Path) -> StorageRoots {
        StorageRoots {
            home_dir: base.join("home"),
            drivefs_dir: base.join("fuse"),
            removable_dir: base.join("removable"),
            play_files_dir: base.join("play"),
        }
    }

    #[test]
    fn test_plan_each_location() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());
        for source in [
            "home/u-1234/Downloads/photos",
            "home/u-1234/MyFiles/photos",
            "fuse/drivefs-abc/root/photos",
            "fuse/drivefs-abc/team_drives/photos",
            "fuse/drivefs-abc/Computers/photos",
            "removable/photos",
            "play/photos",
        ] {
            std::fs::create_dir_all(dir.path().join(source)).unwrap();
        }

        let cases = [
            (StorageLocation::Downloads, "MyFiles/Downloads/photos"),
            (StorageLocation::MyFiles, "MyFiles/photos"),
            (StorageLocation::DriveFsMyDrive, "GoogleDrive/MyDrive/photos"),
            (
                StorageLocation::DriveFsTeamDrives,
                "GoogleDrive/TeamDrives/photos",
            ),
            (
                StorageLocation::DriveFsComputers,
                "GoogleDrive/Computers/photos",
            ),
            (StorageLocation::Removable, "removable/photos"),
            (StorageLocation::PlayFiles, "PlayFiles/photos"),
        ];
        for (location, destination) in cases {
            let plan = plan_mount(
                &roots,
                &location,
                "u-1234",
                "drivefs-abc",
                Path::new("photos"),
            )
            .unwrap();
            assert_eq!(plan.destination, PathBuf::from(destination));
            assert!(plan.source.is_dir(), "{}", plan.source.display());
        }

        let plan = plan_mount(
            &roots,
            &StorageLocation::Downloads,
            "u-1234",
            "",
            Path::new("photos"),
        )
        .unwrap();
        assert_eq!(
            plan.source,
            dir.path().join("home/u-1234/Downloads/photos")
        );
    }

    #[test]
    fn test_whole_location_has_no_trailing_separator() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());
        std::fs::create_dir_all(&roots.removable_dir).unwrap();
        let plan = plan_mount(
            &roots,
            &StorageLocation::Removable,
            "",
            "",
            Path::new(""),
        )
        .unwrap();
        assert_eq!(plan.source, roots.removable_dir);
        assert_eq!(plan.destination, PathBuf::from("removable"));
    }

    #[test]
    fn test_required_components() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());

        for location in [StorageLocation::Downloads, StorageLocation::MyFiles] {
            for owner_id in ["", "..", "a/b"] {
                let err =
                    plan_mount(&roots, &location, owner_id, "", Path::new(""))
                        .unwrap_err();
                assert_eq!(
                    err.to_string(),
                    "owner_id must be a single valid component"
                );
            }
        }

        for location in [
            StorageLocation::DriveFsMyDrive,
            StorageLocation::DriveFsTeamDrives,
            StorageLocation::DriveFsComputers,
        ] {
            for name in ["", "session-abc", "drivefs-a/b", ".."] {
                let err = plan_mount(&roots, &location, "", name, Path::new(""))
                    .unwrap_err();
                assert_eq!(
                    err.to_string(),
                    "drivefs_mount_name must be a single valid component"
                );
            }
        }
    }

    #[test]
    fn test_unknown_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let roots = roots(dir.path());

        let err = plan_mount(
            &roots,
            &StorageLocation::Unknown("FLOPPY".to_string()),
            "u-1234",
            "drivefs-abc",
            Path::new(""),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown storage location");

        let err = plan_mount(
            &roots,
            &StorageLocation::Downloads,
            "u-1234",
            "",
            Path::new("photos"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Requested path does not exist");
    }
}
