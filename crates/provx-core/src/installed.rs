use std::collections::HashMap;

use rayon::prelude::*;
use time::OffsetDateTime;
use tracing::{debug, warn};

use provx_domain::{Platform, ProvisioningProfile};

use crate::handle::IndexHandle;
use crate::reconcile::scan_directories;

impl IndexHandle {
    /// Every profile installed for `platform`, read straight from the watched
    /// directories without consulting the index.
    ///
    /// Files are matched by extension only. One profile is kept per UUID,
    /// preferring the most recently created, and the result is newest first.
    pub fn installed_profiles(
        &self,
        platform: Platform,
        include_expired: bool,
    ) -> Vec<ProvisioningProfile> {
        let extension = platform.file_extension();
        let scan = scan_directories(self.directories());
        let loaded: Vec<ProvisioningProfile> = scan
            .files
            .par_iter()
            .filter(|file| file.path.extension() == Some(extension))
            .filter_map(|file| match self.loader().load_file(file.path.as_std_path()) {
                Ok(profile) => Some(profile),
                Err(err) => {
                    warn!(
                        path = %file.path,
                        %platform,
                        error = %err,
                        "skipping unreadable provisioning profile"
                    );
                    None
                }
            })
            .collect();

        let now = OffsetDateTime::now_utc();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut profiles: Vec<ProvisioningProfile> = Vec::new();
        for profile in loaded {
            if !include_expired && profile.is_expired(now) {
                continue;
            }
            match slots.get(&profile.uuid) {
                Some(&slot) => {
                    if profile.creation_date > profiles[slot].creation_date {
                        profiles[slot] = profile;
                    }
                }
                None => {
                    slots.insert(profile.uuid.clone(), profiles.len());
                    profiles.push(profile);
                }
            }
        }
        profiles.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
        debug!(%platform, installed = profiles.len(), "listed installed profiles");
        profiles
    }
}
