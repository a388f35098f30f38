use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, Listing},
    formatting::{listing_keyboard, render_listing},
    messaging::port::MessagingPort,
    ports::NotificationSink,
    Result,
};

/// Sends each listing to one fixed chat as an HTML message with URL buttons.
pub struct ChatNotifier {
    messenger: Arc<dyn MessagingPort>,
    destination: ChatId,
}

impl ChatNotifier {
    pub fn new(messenger: Arc<dyn MessagingPort>, destination: ChatId) -> Self {
        Self {
            messenger,
            destination,
        }
    }
}

#[async_trait]
impl NotificationSink for ChatNotifier {
    async fn send(&self, listing: &Listing) -> Result<()> {
        let html = render_listing(listing);
        let keyboard = listing_keyboard(listing);
        if keyboard.is_empty() || !self.messenger.capabilities().supports_inline_keyboards {
            self.messenger.send_html(self.destination, &html).await?;
        } else {
            self.messenger
                .send_inline_keyboard(self.destination, &html, keyboard)
                .await?;
        }
        Ok(())
    }
}
