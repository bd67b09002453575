/// Application name
pub const APP_NAME: &str = "CrewChat";

/// File holding the full chat collection
pub const CHATS_FILE_NAME: &str = "chats.json";

/// File holding the per-chat seed flags
pub const SEED_STATUS_FILE_NAME: &str = "seed_status.json";

/// Subdirectory for image attachments (also the prefix of their relative paths)
pub const IMAGES_DIR_NAME: &str = "Images";

/// Suffix of per-chat message files: `<chat id>_messages.json`
pub const MESSAGES_FILE_SUFFIX: &str = "_messages.json";

/// Well-known chat created on first run, and the only one that gets seeded
pub const DEFAULT_CHAT_ID: &str = "default-mumbai-trip";
pub const DEFAULT_CHAT_LABEL: &str = "Mumbai Trip";

/// Simulated agent reply delay bounds in milliseconds
pub const REPLY_DELAY_MIN_MS: u64 = 1_000;
pub const REPLY_DELAY_MAX_MS: u64 = 2_500;

/// JPEG quality used when saving picked images (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Longest edge of generated thumbnails in pixels
pub const THUMBNAIL_MAX_EDGE: u32 = 320;

/// Messages file name for a chat id.
pub fn messages_file_name(chat_id: &str) -> String {
    format!("{chat_id}{MESSAGES_FILE_SUFFIX}")
}
