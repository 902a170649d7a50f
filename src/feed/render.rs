// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::Path;

use rss::extension::itunes::{
    self, ITunesCategoryBuilder, ITunesChannelExtensionBuilder, ITunesItemExtensionBuilder,
    ITunesOwnerBuilder,
};
use rss::{Channel, ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, Item, ItemBuilder};
use sha2::{Digest, Sha256};

use crate::config::Podcast;
use crate::episode::{Episode, content_type_for};
use crate::error::FeedError;

/// Value of the channel's `<generator>` element
pub const GENERATOR: &str = "PodGen";

const EXPLICIT: &str = "No";

/// Stable feed filename of a podcast: hex SHA-256 of its id plus `.rss`
///
/// Independent of feed content, so every regeneration overwrites the same object.
pub fn feed_filename(podcast_id: &str) -> String {
    format!("{:x}.rss", Sha256::digest(podcast_id.as_bytes()))
}

/// Build the RSS channel for a podcast from its uploaded episodes
pub fn build_channel(podcast: &Podcast, episodes: &[Episode], image_url: &str) -> Channel {
    let info = &podcast.info;

    let owner = ITunesOwnerBuilder::default()
        .name(Some(info.owner().to_string()))
        .email(Some(info.email().to_string()))
        .build();

    let category = ITunesCategoryBuilder::default()
        .text(info.category().to_string())
        .build();

    let itunes_ext = ITunesChannelExtensionBuilder::default()
        .author(Some(info.author().to_string()))
        .subtitle(Some(podcast.title.clone()))
        .summary(Some(podcast.title.clone()))
        .explicit(Some(EXPLICIT.to_string()))
        .image(Some(image_url.to_string()))
        .owner(Some(owner))
        .categories(vec![category])
        .build();

    let image = ImageBuilder::default()
        .url(image_url.to_string())
        .title(podcast.title.clone())
        .link(image_url.to_string())
        .build();

    let mut namespaces = BTreeMap::new();
    namespaces.insert("itunes".to_string(), itunes::NAMESPACE.to_string());

    ChannelBuilder::default()
        .namespaces(namespaces)
        .title(podcast.title.clone())
        .description(podcast.title.clone())
        .generator(Some(GENERATOR.to_string()))
        .language(Some(info.language().to_string()))
        .image(Some(image))
        .itunes_ext(Some(itunes_ext))
        .items(
            episodes
                .iter()
                .map(|episode| build_item(episode, image_url))
                .collect::<Vec<_>>(),
        )
        .build()
}

fn build_item(episode: &Episode, image_url: &str) -> Item {
    let location = episode.location.clone().unwrap_or_default();

    let enclosure = EnclosureBuilder::default()
        .url(location)
        .length(episode.size.to_string())
        .mime_type(content_type_for(&episode.filename).to_string())
        .build();

    let guid = GuidBuilder::default()
        .value(episode.filename.clone())
        .permalink(false)
        .build();

    let itunes_ext = ITunesItemExtensionBuilder::default()
        .summary(Some(episode.filename.clone()))
        .image(Some(image_url.to_string()))
        .explicit(Some(EXPLICIT.to_string()))
        .build();

    ItemBuilder::default()
        .title(Some(episode.filename.clone()))
        .description(Some(episode.filename.clone()))
        .pub_date(Some(episode.pub_date.to_rfc2822()))
        .enclosure(Some(enclosure))
        .guid(Some(guid))
        .itunes_ext(Some(itunes_ext))
        .build()
}

/// Render the complete feed document
pub fn render_feed(
    podcast: &Podcast,
    episodes: &[Episode],
    image_url: &str,
) -> Result<String, FeedError> {
    let channel = build_channel(podcast, episodes, image_url);
    let bytes = channel.pretty_write_to(Vec::new(), b' ', 2)?;
    Ok(String::from_utf8(bytes)?)
}

/// Write a rendered feed, replacing any previous version
pub fn write_feed(path: &Path, content: &str) -> Result<(), FeedError> {
    std::fs::write(path, content).map_err(|e| FeedError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PodcastInfo;
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    fn make_podcast(info: PodcastInfo) -> Podcast {
        Podcast {
            title: "History Hour".to_string(),
            folder: "history".to_string(),
            max_size: 0,
            delete_old_episodes: false,
            info,
        }
    }

    fn make_uploaded(filename: &str, size: u64) -> Episode {
        let pub_date = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut episode = Episode::new(filename, size, pub_date);
        episode.mark_uploaded(format!("https://cdn.example.com/history/{}", filename), "s1");
        episode
    }

    fn parse(xml: &str) -> Channel {
        Channel::read_from(xml.as_bytes()).unwrap()
    }

    #[test]
    fn feed_filename_is_deterministic() {
        assert_eq!(feed_filename("history"), feed_filename("history"));
        assert_ne!(feed_filename("history"), feed_filename("music"));
        assert!(feed_filename("history").ends_with(".rss"));
        assert_eq!(feed_filename("history").len(), 64 + 4);
    }

    #[test]
    fn renders_channel_metadata_with_defaults() {
        let xml = render_feed(
            &make_podcast(PodcastInfo::default()),
            &[],
            "https://cdn.example.com/history/podcast.png",
        )
        .unwrap();
        let channel = parse(&xml);

        assert_eq!(channel.title(), "History Hour");
        assert_eq!(channel.language(), Some("EN"));
        assert_eq!(channel.generator(), Some("PodGen"));
        assert_eq!(
            channel.image().map(|i| i.url()),
            Some("https://cdn.example.com/history/podcast.png")
        );

        let itunes = channel.itunes_ext().unwrap();
        assert_eq!(itunes.author(), Some("PodGen"));
        assert_eq!(itunes.owner().and_then(|o| o.email()), Some("podgen@localhost.com"));
        assert_eq!(itunes.categories()[0].text(), "History");
        assert!(channel.items().is_empty());
    }

    #[test]
    fn renders_configured_metadata() {
        let info = PodcastInfo {
            author: Some("Jane Doe".to_string()),
            language: Some("de".to_string()),
            ..Default::default()
        };
        let channel = parse(&render_feed(&make_podcast(info), &[], "").unwrap());

        assert_eq!(channel.language(), Some("de"));
        assert_eq!(channel.itunes_ext().and_then(|i| i.author()), Some("Jane Doe"));
    }

    #[test]
    fn renders_one_item_per_episode() {
        let episodes = vec![
            make_uploaded("2024-01-15-first.mp3", 1234),
            make_uploaded("2024-01-22-second.m4a", 5678),
        ];
        let channel = parse(
            &render_feed(&make_podcast(PodcastInfo::default()), &episodes, "img").unwrap(),
        );

        assert_eq!(channel.items().len(), 2);

        let first = &channel.items()[0];
        assert_eq!(first.title(), Some("2024-01-15-first.mp3"));
        assert_eq!(first.pub_date(), Some("Mon, 15 Jan 2024 00:00:00 +0000"));

        let enclosure = first.enclosure().unwrap();
        assert_eq!(
            enclosure.url(),
            "https://cdn.example.com/history/2024-01-15-first.mp3"
        );
        assert_eq!(enclosure.length(), "1234");
        assert_eq!(enclosure.mime_type(), "audio/mpeg");

        let second = &channel.items()[1];
        assert_eq!(second.enclosure().unwrap().mime_type(), "audio/mp4");
        assert_eq!(second.guid().map(|g| g.value()), Some("2024-01-22-second.m4a"));
    }

    #[test]
    fn escapes_special_characters() {
        let mut podcast = make_podcast(PodcastInfo::default());
        podcast.title = "Rock & Roll <Live>".to_string();

        let xml = render_feed(&podcast, &[], "").unwrap();
        assert!(!xml.contains("Rock & Roll <Live>"));
        assert_eq!(parse(&xml).title(), "Rock & Roll <Live>");
    }

    #[test]
    fn write_feed_overwrites_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(feed_filename("history"));

        write_feed(&path, "first").unwrap();
        write_feed(&path, "second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
