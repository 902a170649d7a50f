// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::{info, warn};

use crate::config::Podcast;
use crate::episode::Status;
use crate::error::SyncError;
use crate::feed::{feed_filename, render_feed, write_feed};
use crate::object_store::object_key;
use crate::progress::ProgressEvent;

use super::Engine;

/// File name of the podcast cover image
pub const PODCAST_IMAGE: &str = "podcast.png";

pub const IMAGE_CONTENT_TYPE: &str = "image/png";

pub const FEED_CONTENT_TYPE: &str = "application/rss+xml";

impl Engine {
    /// Render the feed from the Uploaded episodes, store it in the podcast
    /// folder and upload it. Returns the remote location of the feed.
    pub async fn regenerate_feed(
        &self,
        podcast_id: &str,
        podcast: &Podcast,
        image_url: &str,
    ) -> Result<String, SyncError> {
        let episodes = self.store.find_by_status(podcast_id, Status::Uploaded)?;
        let content = render_feed(podcast, &episodes, image_url)?;

        let filename = feed_filename(podcast_id);
        let local_path = self.podcast_folder(podcast).join(&filename);
        write_feed(&local_path, &content)?;

        let key = object_key(&podcast.folder, &filename);
        let location = self
            .objects
            .put(&key, &local_path, FEED_CONTENT_TYPE)
            .await?;

        info!(
            podcast = podcast_id,
            episodes = episodes.len(),
            location = %location,
            "feed published"
        );
        self.reporter.report(ProgressEvent::FeedPublished {
            podcast_id: podcast_id.to_string(),
            location: location.clone(),
        });

        Ok(location)
    }

    /// Upload the cover image from the podcast folder, falling back to the
    /// storage root. Returns its remote location.
    pub async fn upload_podcast_image(
        &self,
        podcast_id: &str,
        podcast: &Podcast,
    ) -> Result<String, SyncError> {
        let candidates = vec![
            self.podcast_folder(podcast).join(PODCAST_IMAGE),
            self.storage_root().join(PODCAST_IMAGE),
        ];

        let Some(local_path) = candidates.iter().find(|path| path.is_file()) else {
            return Err(SyncError::ImageNotFound(candidates));
        };

        let key = object_key(&podcast.folder, PODCAST_IMAGE);
        let location = self
            .objects
            .put(&key, local_path, IMAGE_CONTENT_TYPE)
            .await?;

        info!(podcast = podcast_id, location = %location, "podcast image uploaded");
        self.reporter.report(ProgressEvent::ImagePublished {
            podcast_id: podcast_id.to_string(),
            location: location.clone(),
        });

        Ok(location)
    }

    /// Location of the already uploaded cover image, if there is one
    pub async fn podcast_image_location(
        &self,
        podcast_id: &str,
        podcast: &Podcast,
    ) -> Result<Option<String>, SyncError> {
        let key = object_key(&podcast.folder, PODCAST_IMAGE);
        let info = self.objects.stat(&key).await?;

        if info.is_none() {
            warn!(podcast = podcast_id, key = %key, "podcast image not found in object store");
        }

        Ok(info.map(|info| info.location))
    }
}
