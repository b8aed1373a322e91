//! Inbound message routing
//!
//! `ReceiptService::handle` takes one submission from the messaging
//! transport and does whatever it asks for: registration, text commands,
//! typed amounts, or receipt images. Images are not processed here; they are
//! handed to the batch aggregator and processed once their group goes idle.
//!
//! Every handled submission logs and swallows its own errors after telling
//! the sender what went wrong.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::amount::{format_amount, parse_manual_amount};
use crate::batch::SubmitOutcome;
use crate::error::{Error, Result};
use crate::models::{
    is_safe_name, is_supported_image, CollectionKey, ImageKind, Submission, UserAccount,
    SUPPORTED_IMAGE_EXTENSIONS,
};
use crate::pipeline::{Collaborators, NOT_ACTIVE_TEXT, NOT_REGISTERED_TEXT};
use crate::report::{render_user_info, Report};
use crate::stores::Stores;

const END_DATE_FORMATS: &[&str] = &["%Y.%m.%d", "%Y-%m-%d", "%d.%m.%Y"];

const AMOUNT_HINT: &str =
    "Invalid amount. Enter a number with rubles and kopecks separated by a comma, for example: 18,03";

/// Where an unregistered chat is in the registration dialogue
#[derive(Debug, Clone, PartialEq, Eq)]
enum Registration {
    AwaitingCity,
    AwaitingName { city: String },
}

pub struct ReceiptService {
    stores: Stores,
    collaborators: Collaborators,
    separator: char,
    cities: Vec<String>,
    pending: Mutex<HashMap<i64, Registration>>,
}

impl ReceiptService {
    pub fn new(stores: Stores, collaborators: Collaborators, separator: char, cities: Vec<String>) -> Self {
        Self {
            stores,
            collaborators,
            separator,
            cities,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Handle one inbound submission, replying through the gateway
    pub async fn handle(&self, submission: Submission) {
        let chat_id = submission.chat_id;
        if let Err(e) = self.dispatch(submission).await {
            let reply = match &e {
                Error::NotRegistered(_) => NOT_REGISTERED_TEXT.to_string(),
                Error::CollectionNotActive(_) => NOT_ACTIVE_TEXT.to_string(),
                Error::PermissionDenied(_) => "You do not have permission to run this command.".to_string(),
                Error::InvalidAmount(_) => AMOUNT_HINT.to_string(),
                Error::UnsupportedFormat(name) => format!(
                    "Unsupported file format: {}. Expected: {}.",
                    name,
                    SUPPORTED_IMAGE_EXTENSIONS.join(", ")
                ),
                Error::InvalidData(message) => message.clone(),
                other => {
                    error!(chat_id, error = %other, "Submission handling failed");
                    "Something went wrong. Please try again later.".to_string()
                }
            };
            debug!(chat_id, error = %e, "Submission rejected");
            self.reply(chat_id, &reply).await;
        }
    }

    async fn dispatch(&self, submission: Submission) -> Result<()> {
        let chat_id = submission.chat_id;

        if let Some(step) = self.pending_step(chat_id) {
            return self.continue_registration(step, &submission).await;
        }

        let Some(user) = self.find_sender(&submission)? else {
            return match submission.text.as_deref().map(command_name).as_deref() {
                Some("/start") => self.begin_registration(chat_id).await,
                _ => Err(Error::NotRegistered(chat_id)),
            };
        };

        if !submission.images.is_empty() {
            return self.accept_images(&user, submission).await;
        }

        match submission.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => self.text_message(&user, text).await,
            _ => {
                self.reply(chat_id, "Sorry, this type of message is not supported yet.")
                    .await;
                Ok(())
            }
        }
    }

    /// Look the sender up by chat id, then by username
    ///
    /// A username match under another chat id is moved to the new chat.
    fn find_sender(&self, submission: &Submission) -> Result<Option<UserAccount>> {
        let users = &self.stores.users;
        if let Some(user) = users.find_by_chat(submission.chat_id)? {
            return Ok(Some(user));
        }

        let Some(username) = submission.username.as_deref().filter(|u| is_safe_name(u)) else {
            return Ok(None);
        };
        match users.find_by_username(username)? {
            Some(known) => users.rebind_chat(known.chat_id, submission.chat_id).map(Some),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    fn pending_step(&self, chat_id: i64) -> Option<Registration> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat_id)
            .cloned()
    }

    fn set_pending(&self, chat_id: i64, step: Option<Registration>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match step {
            Some(step) => pending.insert(chat_id, step),
            None => pending.remove(&chat_id),
        };
    }

    async fn begin_registration(&self, chat_id: i64) -> Result<()> {
        self.set_pending(chat_id, Some(Registration::AwaitingCity));
        let prompt = if self.cities.is_empty() {
            "Enter your city:".to_string()
        } else {
            format!("Enter your city ({}):", self.cities.join(", "))
        };
        self.reply(chat_id, &prompt).await;
        Ok(())
    }

    async fn continue_registration(&self, step: Registration, submission: &Submission) -> Result<()> {
        let chat_id = submission.chat_id;
        let Some(text) = submission.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return Err(Error::InvalidData("Please enter text.".into()));
        };

        match step {
            Registration::AwaitingCity => {
                let city = self.match_city(text)?;
                self.set_pending(chat_id, Some(Registration::AwaitingName { city }));
                self.reply(chat_id, "Enter your last name and first name separated by a space:")
                    .await;
            }
            Registration::AwaitingName { city } => {
                let parts: Vec<&str> = text.split_whitespace().collect();
                if parts.len() < 2 || !parts[..2].iter().all(|p| is_safe_name(p)) {
                    return Err(Error::InvalidData(
                        "Enter your last name and first name separated by a space.".into(),
                    ));
                }

                let user = self.stores.users.upsert(UserAccount {
                    username: submission.username.clone().filter(|u| is_safe_name(u)),
                    chat_id,
                    first_name: parts[1].to_string(),
                    last_name: parts[0].to_string(),
                    city,
                    is_admin: false,
                })?;
                self.set_pending(chat_id, None);

                let reply = if self.stores.registry.find_active(&user.city).is_some() {
                    "You are registered! Send your receipt screenshots and the amounts of your receipts, \
                     with rubles and kopecks separated by a comma, for example: 12,03\n\
                     Send /start to see the available commands."
                } else {
                    "You are registered! Report collection for your city is not active yet. \
                     You will be notified when an administrator starts it.\n\
                     Send /start to see the available commands."
                };
                self.reply(chat_id, reply).await;
            }
        }
        Ok(())
    }

    fn match_city(&self, text: &str) -> Result<String> {
        let normalized = text.replace('ё', "е").replace('Ё', "Е");
        if self.cities.is_empty() {
            if normalized.split_whitespace().count() == 1 && is_safe_name(&normalized) {
                return Ok(normalized);
            }
            return Err(Error::InvalidData("Invalid city name. Enter a single word.".into()));
        }

        let city = self
            .cities
            .iter()
            .find(|c| c.replace('ё', "е").to_lowercase() == normalized.to_lowercase())
            .map(|c| c.replace('ё', "е"))
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "Unknown city. Choose one of: {}.",
                    self.cities.join(", ")
                ))
            })?;

        // A configured city that cannot be stored would register a user who
        // is never found again
        if !is_safe_name(&city) {
            error!(city = %city, "Configured city is not a single word");
            return Err(Error::Config(format!("unusable city name: {}", city)));
        }
        Ok(city)
    }

    // ========================================================================
    // Text
    // ========================================================================

    async fn text_message(&self, user: &UserAccount, text: &str) -> Result<()> {
        let args: Vec<&str> = text.split_whitespace().collect();
        match command_name(text).as_str() {
            "/start" => self.help(user).await,
            "/collect" => self.collect(user, &args[1..]).await,
            "/finish" => self.finish(user).await,
            "/total" => self.total(user).await,
            "/info" => self.info(user).await,
            "/clear" => self.clear(user).await,
            "/delete" => self.delete(user).await,
            "/godmode" => self.god_mode(user).await,
            command if command.starts_with('/') => {
                self.reply(user.chat_id, "Unknown command. Send /start to see the available commands.")
                    .await;
                Ok(())
            }
            _ => self.manual_amount(user, text).await,
        }
    }

    async fn help(&self, user: &UserAccount) -> Result<()> {
        let mut text = String::from("Available commands:\n");
        if user.is_admin {
            text.push_str(
                "/collect <period> <end date> - start collecting reports\n\
                 /finish - finish collecting and send the report\n\
                 /total - show the total receipt amount for your city\n",
            );
        }
        text.push_str(
            "/info - show information about your reports\n\
             /delete - delete your registration\n\
             /clear - remove every file you sent for the current period\n\
             Send receipt screenshots, or type an amount such as 18,03.",
        );
        self.reply(user.chat_id, &text).await;
        Ok(())
    }

    async fn collect(&self, user: &UserAccount, args: &[&str]) -> Result<()> {
        require_admin(user)?;
        let (Some(period), Some(end)) = (args.first(), args.get(1)) else {
            return Err(Error::InvalidData(
                "Usage: /collect <period> <end date>\nExample: /collect february 2025.03.20".into(),
            ));
        };
        if !is_safe_name(period) {
            return Err(Error::InvalidData(format!("Invalid period name: {}", period)));
        }
        let end_date = parse_end_date(end)
            .ok_or_else(|| Error::InvalidData("Invalid end date.".into()))?;

        let key = CollectionKey::new(&user.city, *period);
        match self.stores.registry.open(&key) {
            Ok(()) => {}
            Err(Error::CollectionActive { period, .. }) => {
                self.reply(
                    user.chat_id,
                    &format!("Collection for {} in {} is already running.", period, user.city),
                )
                .await;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        info!(%key, end = %end_date, admin = user.chat_id, "Collection opened");

        let end_text = end_date.format("%Y-%m-%d");
        self.reply(
            user.chat_id,
            &format!("Collection of reports for {} in {} started until {}.", period, user.city, end_text),
        )
        .await;
        self.notify_city(
            &user.city,
            &format!(
                "Collection of reports for {} started, open until {}. Send your screenshots, \
                 or type the amount of your receipts.\nSend /start to see the available commands.",
                period, end_text
            ),
        )
        .await?;
        Ok(())
    }

    async fn finish(&self, user: &UserAccount) -> Result<()> {
        require_admin(user)?;
        let Some(key) = self.stores.registry.find_active(&user.city) else {
            self.reply(user.chat_id, "Report collection has not started yet.").await;
            return Ok(());
        };

        let report = Report::for_period(&self.stores.ledger, &key)?;
        let text = report.render(self.separator);
        self.collaborators
            .gateway
            .send_document(user.chat_id, text.clone().into_bytes(), &report.file_name())
            .await?;
        self.reply(user.chat_id, &text).await;

        self.stores.registry.close(&key)?;
        info!(%key, admin = user.chat_id, "Collection closed");

        self.notify_city(
            &key.city,
            &format!("Collection of reports for {} is finished. Thank you for taking part!", key.period),
        )
        .await
    }

    async fn total(&self, user: &UserAccount) -> Result<()> {
        require_admin(user)?;
        let key = self.stores.registry.require_active(&user.city)?;
        let users = self.stores.users.in_city(&user.city)?;
        let total = Report::city_total(&self.stores.ledger, &key, &users)?;
        self.reply(
            user.chat_id,
            &format!("Total receipt amount: {}", format_amount(total, self.separator)),
        )
        .await;
        Ok(())
    }

    async fn info(&self, user: &UserAccount) -> Result<()> {
        let key = self.stores.registry.require_active(&user.city)?;
        let summary = self.stores.ledger.summary(&key, user)?;
        if summary.is_none() {
            self.reply(user.chat_id, "Your folder was not found.").await;
            return Ok(());
        }
        self.reply(user.chat_id, &render_user_info(summary.as_ref(), self.separator))
            .await;
        Ok(())
    }

    async fn clear(&self, user: &UserAccount) -> Result<()> {
        let key = self.stores.registry.require_active(&user.city)?;
        match self.stores.ledger.clear_user(&key, user) {
            Ok(removed) => {
                info!(chat_id = user.chat_id, %key, removed, "User folder cleared");
                self.reply(user.chat_id, "Your folder has been cleared. You can start over.")
                    .await;
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                self.reply(user.chat_id, "Your folder was not found.").await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, user: &UserAccount) -> Result<()> {
        self.stores.users.remove(user.chat_id)?;
        self.reply(
            user.chat_id,
            "Your registration has been removed. Send /start to register again.",
        )
        .await;
        Ok(())
    }

    async fn god_mode(&self, user: &UserAccount) -> Result<()> {
        let updated = self.stores.users.toggle_admin(user.chat_id)?;
        warn!(chat_id = user.chat_id, is_admin = updated.is_admin, "Admin flag toggled");
        let text = if updated.is_admin {
            "Administrator mode enabled."
        } else {
            "Administrator mode disabled. You are a regular user now."
        };
        self.reply(user.chat_id, text).await;
        Ok(())
    }

    async fn manual_amount(&self, user: &UserAccount, text: &str) -> Result<()> {
        let key = self.stores.registry.require_active(&user.city)?;
        let amount = parse_manual_amount(text)?;
        self.stores
            .ledger
            .append_manual(&key, user, amount, Local::now().date_naive())?;
        self.reply(
            user.chat_id,
            &format!("Receipt amount {} added.", format_amount(amount, self.separator)),
        )
        .await;
        Ok(())
    }

    // ========================================================================
    // Images
    // ========================================================================

    async fn accept_images(&self, user: &UserAccount, submission: Submission) -> Result<()> {
        self.stores.registry.require_active(&user.city)?;

        let group_id = submission
            .group_id
            .unwrap_or_else(|| self.stores.aggregator.one_shot_id(user.chat_id));
        let now = Instant::now();

        let mut rejected = Vec::new();
        for image in submission.images {
            if image.kind == ImageKind::Document {
                let name = image.file_name.as_deref().unwrap_or_default();
                if !is_supported_image(name) {
                    rejected.push(name.to_string());
                    continue;
                }
            }
            if self.stores.aggregator.submit(&group_id, user.chat_id, image, now) == SubmitOutcome::Created {
                debug!(group = %group_id, chat_id = user.chat_id, "Waiting for the rest of the group");
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(Error::UnsupportedFormat(rejected.join(", ")))
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.collaborators.gateway.send_text(chat_id, text).await {
            warn!(chat_id, error = %e, "Failed to send reply");
        }
    }

    /// Message every non-admin user of a city
    async fn notify_city(&self, city: &str, text: &str) -> Result<()> {
        let users = self.stores.users.in_city(city)?;
        let recipients: Vec<_> = users.iter().filter(|u| !u.is_admin).collect();
        for user in &recipients {
            self.reply(user.chat_id, text).await;
        }
        debug!(%city, recipients = recipients.len(), "City notified");
        Ok(())
    }
}

fn require_admin(user: &UserAccount) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!("chat {}", user.chat_id)))
    }
}

/// Lowercased first word, without a `@botname` suffix
fn command_name(text: &str) -> String {
    let first = text.split_whitespace().next().unwrap_or_default();
    first.split('@').next().unwrap_or(first).to_lowercase()
}

fn parse_end_date(s: &str) -> Option<NaiveDate> {
    END_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::MemoryImageSource;
    use crate::config::Config;
    use crate::extract::ExtractorClient;
    use crate::gateway::{RecordingGateway, SentMessage};
    use crate::models::ImageRef;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        service: ReceiptService,
        gateway: RecordingGateway,
    }

    fn fixture(cities: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let stores = Stores::open(&Config::with_data_dir(dir.path())).unwrap();
        let gateway = RecordingGateway::new();
        let collaborators = Collaborators {
            source: Arc::new(MemoryImageSource::new()),
            extractor: Arc::new(ExtractorClient::scripted(Vec::<String>::new())),
            gateway: Arc::new(gateway.clone()),
        };
        let service = ReceiptService::new(
            stores,
            collaborators,
            ',',
            cities.iter().map(|c| c.to_string()).collect(),
        );
        Fixture {
            _dir: dir,
            service,
            gateway,
        }
    }

    fn text(chat_id: i64, text: &str) -> Submission {
        Submission {
            chat_id,
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn add_user(f: &Fixture, line: &str) -> UserAccount {
        let user: UserAccount = line.parse().unwrap();
        f.service.stores.users.upsert(user.clone()).unwrap();
        user
    }

    fn last_text(f: &Fixture, chat_id: i64) -> String {
        f.gateway.texts_to(chat_id).pop().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_registration_dialogue() {
        let f = fixture(&["Minsk", "Кишинёв"]);

        f.service.handle(text(5, "hello")).await;
        assert_eq!(last_text(&f, 5), NOT_REGISTERED_TEXT);

        f.service.handle(text(5, "/start")).await;
        assert!(last_text(&f, 5).contains("Minsk"));

        f.service.handle(text(5, "Atlantis")).await;
        assert!(last_text(&f, 5).starts_with("Unknown city"));

        f.service.handle(text(5, "кишинев")).await;
        f.service.handle(text(5, "Petrov")).await;
        assert!(last_text(&f, 5).contains("last name and first name"));

        f.service
            .handle(Submission {
                username: Some("petya".into()),
                ..text(5, "Petrov Petr")
            })
            .await;
        let user = f.service.stores.users.find_by_chat(5).unwrap().unwrap();
        assert_eq!(user.city, "Кишинев");
        assert_eq!(user.folder_name(), "Petrov_Petr");
        assert_eq!(user.username.as_deref(), Some("petya"));
        assert!(last_text(&f, 5).contains("not active yet"));
    }

    #[tokio::test]
    async fn test_registration_refuses_unstorable_city() {
        let f = fixture(&["Nizhny Novgorod"]);

        f.service.handle(text(5, "/start")).await;
        f.service.handle(text(5, "nizhny novgorod")).await;
        assert!(!last_text(&f, 5).contains("last name"));

        f.service.handle(text(5, "Petrov Petr")).await;
        assert!(!last_text(&f, 5).contains("You are registered"));
        assert!(f.service.stores.users.list().unwrap().is_empty());
        assert!(f.service.stores.users.find_by_chat(5).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_known_username_from_new_chat_is_recognized() {
        let f = fixture(&[]);
        add_user(&f, "petya 5 Petr Petrov Minsk false");

        f.service
            .handle(Submission {
                username: Some("petya".into()),
                ..text(77, "/info")
            })
            .await;

        assert_eq!(last_text(&f, 77), NOT_ACTIVE_TEXT);
        let user = f.service.stores.users.find_by_chat(77).unwrap().unwrap();
        assert_eq!(user.folder_name(), "Petrov_Petr");
        assert!(f.service.stores.users.find_by_chat(5).unwrap().is_none());

        // Unknown usernames still have to register
        f.service
            .handle(Submission {
                username: Some("stranger".into()),
                ..text(78, "/info")
            })
            .await;
        assert_eq!(last_text(&f, 78), NOT_REGISTERED_TEXT);
    }

    #[tokio::test]
    async fn test_collect_notifies_city_and_rejects_second_open() {
        let f = fixture(&[]);
        add_user(&f, "boss 1 Anna Admin Minsk true");
        add_user(&f, "ivan 2 Ivan Petrov Minsk false");
        add_user(&f, "olga 3 Olga Smirnova Gomel false");

        f.service.handle(text(1, "/collect march 2025.03.31")).await;
        assert_eq!(
            f.service.stores.registry.find_active("Minsk"),
            Some(CollectionKey::new("Minsk", "march"))
        );
        assert!(last_text(&f, 1).contains("until 2025-03-31"));
        assert!(last_text(&f, 2).contains("march"));
        assert!(f.gateway.texts_to(3).is_empty());

        f.service.handle(text(1, "/collect april 2025-04-30")).await;
        assert!(last_text(&f, 1).contains("already running"));
    }

    #[tokio::test]
    async fn test_admin_commands_need_admin() {
        let f = fixture(&[]);
        add_user(&f, "ivan 2 Ivan Petrov Minsk false");
        f.service.handle(text(2, "/collect march 2025.03.31")).await;
        assert!(last_text(&f, 2).contains("permission"));
        assert!(f.service.stores.registry.is_empty());
    }

    #[tokio::test]
    async fn test_collect_rejects_bad_date() {
        let f = fixture(&[]);
        add_user(&f, "boss 1 Anna Admin Minsk true");
        f.service.handle(text(1, "/collect march someday")).await;
        assert_eq!(last_text(&f, 1), "Invalid end date.");
        f.service.handle(text(1, "/collect ../etc 2025.03.31")).await;
        assert!(f.service.stores.registry.is_empty());
    }

    #[tokio::test]
    async fn test_manual_amount_and_info() {
        let f = fixture(&[]);
        let user = add_user(&f, "ivan 2 Ivan Petrov Minsk false");

        f.service.handle(text(2, "18,03")).await;
        assert_eq!(last_text(&f, 2), NOT_ACTIVE_TEXT);

        let key = CollectionKey::new("Minsk", "march");
        f.service.stores.registry.open(&key).unwrap();

        f.service.handle(text(2, "eighteen")).await;
        assert_eq!(last_text(&f, 2), AMOUNT_HINT);

        f.service.handle(text(2, "18,03")).await;
        assert_eq!(last_text(&f, 2), "Receipt amount 18,03 added.");
        assert_eq!(
            f.service.stores.ledger.total_for(&key, &user).unwrap(),
            Some(Decimal::new(1803, 2))
        );

        f.service.handle(text(2, "/info")).await;
        assert!(last_text(&f, 2).contains("Last manual amount: 18,03"));
    }

    #[tokio::test]
    async fn test_images_are_buffered_and_formats_checked() {
        let f = fixture(&[]);
        add_user(&f, "ivan 2 Ivan Petrov Minsk false");
        f.service
            .stores
            .registry
            .open(&CollectionKey::new("Minsk", "march"))
            .unwrap();

        f.service
            .handle(Submission {
                chat_id: 2,
                group_id: Some("album".into()),
                images: vec![
                    ImageRef::photo("p1", "u1"),
                    ImageRef::document("d1", "u2", "notes.pdf"),
                    ImageRef::document("d2", "u3", "scan.PNG"),
                ],
                ..Default::default()
            })
            .await;

        assert_eq!(f.service.stores.aggregator.len(), 1);
        assert!(last_text(&f, 2).contains("Unsupported file format: notes.pdf"));

        let lone = Submission {
            chat_id: 2,
            images: vec![ImageRef::photo("p2", "u4")],
            ..Default::default()
        };
        f.service.handle(lone.clone()).await;
        f.service.handle(lone).await;
        assert_eq!(f.service.stores.aggregator.len(), 3);
    }

    #[tokio::test]
    async fn test_finish_sends_report_and_closes() {
        let f = fixture(&[]);
        let admin = add_user(&f, "boss 1 Anna Admin Minsk true");
        let user = add_user(&f, "ivan 2 Ivan Petrov Minsk false");
        let key = CollectionKey::new("Minsk", "march");
        f.service.stores.registry.open(&key).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        f.service
            .stores
            .ledger
            .append_auto(&key, &user, Decimal::from(40), day)
            .unwrap();

        f.service.handle(text(1, "/total")).await;
        assert_eq!(last_text(&f, 1), "Total receipt amount: 40");

        f.service.handle(text(admin.chat_id, "/finish")).await;
        assert!(f.service.stores.registry.find_active("Minsk").is_none());

        let documents: Vec<_> = f
            .gateway
            .sent()
            .into_iter()
            .filter(|m| matches!(m, SentMessage::Document { .. }))
            .collect();
        assert_eq!(documents.len(), 1);
        if let SentMessage::Document { filename, bytes, .. } = &documents[0] {
            assert_eq!(filename, "report_Minsk_march.txt");
            assert!(String::from_utf8_lossy(bytes).contains("Petrov_Ivan"));
        }
        assert!(last_text(&f, 2).contains("finished"));

        f.service.handle(text(1, "/finish")).await;
        assert_eq!(last_text(&f, 1), "Report collection has not started yet.");
    }

    #[tokio::test]
    async fn test_clear_delete_and_god_mode() {
        let f = fixture(&[]);
        let user = add_user(&f, "ivan 2 Ivan Petrov Minsk false");
        let key = CollectionKey::new("Minsk", "march");
        f.service.stores.registry.open(&key).unwrap();

        f.service.handle(text(2, "/clear")).await;
        assert_eq!(last_text(&f, 2), "Your folder was not found.");

        f.service.handle(text(2, "5")).await;
        f.service.handle(text(2, "/clear")).await;
        assert!(last_text(&f, 2).contains("cleared"));
        assert_eq!(f.service.stores.ledger.total_for(&key, &user).unwrap(), None);

        f.service.handle(text(2, "/godmode")).await;
        assert!(f.service.stores.users.find_by_chat(2).unwrap().unwrap().is_admin);

        f.service.handle(text(2, "/delete")).await;
        assert!(f.service.stores.users.find_by_chat(2).unwrap().is_none());
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name("/collect march 2025.03.20"), "/collect");
        assert_eq!(command_name("/info@tally_bot"), "/info");
        assert_eq!(command_name("/GodMode"), "/godmode");
        assert_eq!(command_name("18,03"), "18,03");
    }

    #[test]
    fn test_parse_end_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 20);
        assert_eq!(parse_end_date("2025.03.20"), expected);
        assert_eq!(parse_end_date("2025-03-20"), expected);
        assert_eq!(parse_end_date("20.03.2025"), expected);
        assert_eq!(parse_end_date("2025.13.01"), None);
    }
}
