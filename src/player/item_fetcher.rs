use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::backend::{MediaApiContract, MediaApiError};
use crate::player::state::PlaybackTarget;
use crate::player::PLAYER_LOG_TARGET;
use crate::progress::LocalStore;

/// Fetches what is needed to play `media_id`.
///
/// Signed URLs are required. Metadata is best effort: without it the target
/// has no server resume position, and the locally cached one is used instead.
#[instrument(skip(api, store), fields(media_id = %media_id))]
pub async fn fetch_target(
    api: Arc<dyn MediaApiContract>,
    store: &LocalStore,
    media_id: &str,
) -> Result<PlaybackTarget, MediaApiError> {
    let (media, urls) = tokio::join!(api.get_media(media_id), api.get_signed_urls(media_id));

    let urls = urls?;
    let media = match media {
        Ok(media) => Some(media),
        Err(e) => {
            warn!(target: PLAYER_LOG_TARGET, "Metadata for {} unavailable, skipping server resume position: {}", media_id, e);
            None
        }
    };

    let mut target = PlaybackTarget::from_parts(media_id, media.as_ref(), &urls, |u| api.resolve_url(u));
    if target.resume_position <= 0.0 {
        if let Some(local) = store.watch_progress(media_id) {
            target.resume_position = local.position as f64;
            if target.duration.is_none() {
                target.duration = local.duration.map(|d| d as f64);
            }
        }
    }

    info!(
        target: PLAYER_LOG_TARGET,
        "Loaded target {} ({}), resume at {:.0}s",
        target.media_id, target.title, target.resume_position
    );
    Ok(target)
}
