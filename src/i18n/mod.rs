//! Internationalization (i18n) module.
//!
//! Provides localized strings for the CLI. English is the default language;
//! Russian is available as an alternative.

use std::sync::OnceLock;

use crate::error::Stage;

static CURRENT_LANG: OnceLock<Lang> = OnceLock::new();

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    /// English (default)
    En,
    /// Russian
    Ru,
}

impl Lang {
    /// Parse a language code string (e.g. "en", "ru", "en_US", "ru_RU.UTF-8").
    /// Returns `None` for unrecognized codes.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.to_lowercase();
        let prefix = normalized.split(['_', '-', '.']).next().unwrap_or("");
        match prefix {
            "en" => Some(Self::En),
            "ru" => Some(Self::Ru),
            _ => None,
        }
    }

    /// Return the ISO 639-1 code for this language.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }
}

/// Initialize the global language. Call once at startup.
/// If already initialized, this is a no-op.
pub fn set_lang(lang: Lang) {
    let _ = CURRENT_LANG.set(lang);
}

/// Get the currently configured language (defaults to English).
pub fn lang() -> Lang {
    CURRENT_LANG.get().copied().unwrap_or(Lang::En)
}

/// Detect language from the `MAILTIDE_LANG` / `LC_MESSAGES` / `LANG` environment variables.
pub fn detect_system_lang() -> Lang {
    ["MAILTIDE_LANG", "LC_MESSAGES", "LANG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().and_then(|v| Lang::from_code(&v)))
        .unwrap_or(Lang::En)
}

/// Macro for defining translatable message functions.
/// Each function returns a `&'static str` based on the current language.
macro_rules! msg {
    ($name:ident, $en:expr, $ru:expr) => {
        /// Returns a localized string for the current language.
        pub fn $name() -> &'static str {
            match lang() {
                Lang::En => $en,
                Lang::Ru => $ru,
            }
        }
    };
}

// ── General ──────────────────────────────────────────────────────

msg!(
    app_about,
    "mailtide \u{2014} send mail over SMTP, read recent IMAP messages and save their attachments",
    "mailtide \u{2014} отправка писем по SMTP, чтение последних писем по IMAP и сохранение вложений"
);

msg!(
    app_after_help,
    "Run without a command for the interactive menu.\nCredentials: [account] in the config file, or MAILTIDE_ADDRESS / MAILTIDE_PASSWORD.",
    "Запуск без команды открывает интерактивное меню.\nУчётные данные: [account] в файле настроек или MAILTIDE_ADDRESS / MAILTIDE_PASSWORD."
);
msg!(help_cmd_send, "Send a message over SMTP", "Отправить письмо по SMTP");
msg!(
    help_cmd_read,
    "Read recent messages and save their attachments",
    "Прочитать последние письма и сохранить вложения"
);
msg!(help_cmd_config, "Create or locate the config file", "Создать или найти файл настроек");
msg!(help_cmd_completions, "Generate shell completions", "Сгенерировать автодополнение для оболочки");
msg!(help_cmd_manpage, "Generate a man page", "Сгенерировать man-страницу");

// ── Interactive menu ─────────────────────────────────────────────

msg!(menu_title, "Mail client \u{2014} send / read", "Почтовый клиент \u{2014} отправка/чтение");
msg!(menu_send, "1 - Send a message", "1 - Отправить письмо");
msg!(menu_recent, "2 - Read inbox (last N)", "2 - Прочитать входящие (последние N)");
msg!(menu_unseen, "3 - Read unread only", "3 - Прочитать только непрочитанные");
msg!(menu_quit, "q - Quit", "q - Выход");
msg!(prompt_choice, "Choice: ", "Выбор: ");
msg!(prompt_to, "To (email): ", "Кому (email): ");
msg!(prompt_subject, "Subject: ", "Тема: ");
msg!(
    prompt_body,
    "Enter the text (finish with a line containing only 'END'):",
    "Введите текст (заканчивается строкой с одним 'END'):"
);
msg!(
    prompt_attachments,
    "Files to attach (comma-separated), empty for none: ",
    "Файлы для вложения (через запятую), пусто \u{2014} без вложений: "
);
msg!(
    prompt_recent_count,
    "How many recent messages to show? (default 10): ",
    "Сколько последних писем показать? (по умолчанию 10): "
);
msg!(
    prompt_unseen_count,
    "How many recent unread messages to show? (default 10): ",
    "Сколько последних непрочитанных показать? (по умолчанию 10): "
);
msg!(msg_goodbye, "Bye.", "Выход.");
msg!(msg_cancelled, "Cancelled by user.", "Отмена пользователем.");

// ── Message summaries ────────────────────────────────────────────

msg!(label_message, "Message ID", "Письмо ID");
msg!(label_from, "From:", "От:");
msg!(label_subject, "Subject:", "Тема:");
msg!(label_date, "Date:", "Дата:");
msg!(label_text, "Text (first {} characters):", "Текст (первые {} символов):");
msg!(label_saved_attachments, "Saved attachments:", "Сохранены вложения:");
msg!(msg_no_attachments, "No attachments.", "Вложений нет.");
msg!(msg_no_messages, "No messages found.", "Входящих писем не найдено.");
msg!(msg_skipped, "Skipped:", "Пропущены:");
msg!(msg_fetching, "Fetching", "Загрузка");

// ── Send ─────────────────────────────────────────────────────────

msg!(msg_sent_to, "Message sent to", "Письмо отправлено на");
msg!(msg_attachment_missing, "Attachment not found:", "Вложение не найдено:");

// ── Config ───────────────────────────────────────────────────────

msg!(msg_config_written, "Config written to", "Настройки записаны в");
msg!(msg_config_exists, "Config already exists at", "Файл настроек уже существует:");
msg!(err_no_config_path, "Could not determine config file path", "Не удалось определить путь к файлу настроек");

// ── Errors ───────────────────────────────────────────────────────

msg!(err_prefix, "Error", "Ошибка");
msg!(err_unknown_choice, "Unknown choice.", "Неизвестный выбор.");

/// Localized name of a failing stage.
pub fn stage_name(stage: Stage) -> &'static str {
    match (stage, lang()) {
        (Stage::Login, Lang::En) => "login",
        (Stage::Login, Lang::Ru) => "вход",
        (Stage::Connect, Lang::En) => "connection",
        (Stage::Connect, Lang::Ru) => "подключение",
        (Stage::Select, Lang::En) => "folder selection",
        (Stage::Select, Lang::Ru) => "выбор папки",
        (Stage::Search, Lang::En) => "message search",
        (Stage::Search, Lang::Ru) => "поиск писем",
        (Stage::Fetch, Lang::En) => "fetch",
        (Stage::Fetch, Lang::Ru) => "получение письма",
        (Stage::MarkSeen, Lang::En) => "mark as read",
        (Stage::MarkSeen, Lang::Ru) => "отметка прочитанным",
        (Stage::SaveAttachment, Lang::En) => "saving attachment",
        (Stage::SaveAttachment, Lang::Ru) => "сохранение вложения",
        (Stage::Compose, Lang::En) => "composing message",
        (Stage::Compose, Lang::Ru) => "составление письма",
        (Stage::Send, Lang::En) => "sending",
        (Stage::Send, Lang::Ru) => "отправка",
        (Stage::Config, Lang::En) => "configuration",
        (Stage::Config, Lang::Ru) => "настройки",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_from_code() {
        assert_eq!(Lang::from_code("en"), Some(Lang::En));
        assert_eq!(Lang::from_code("ru"), Some(Lang::Ru));
        assert_eq!(Lang::from_code("en_US"), Some(Lang::En));
        assert_eq!(Lang::from_code("ru_RU.UTF-8"), Some(Lang::Ru));
        assert_eq!(Lang::from_code("fr"), None);
    }

    #[test]
    fn test_lang_code_roundtrip() {
        assert_eq!(Lang::En.code(), "en");
        assert_eq!(Lang::Ru.code(), "ru");
    }

    #[test]
    fn test_messages_return_strings() {
        // OnceLock may already be set by another test; only check non-empty
        assert!(!app_about().is_empty());
        assert!(!menu_title().is_empty());
        assert!(!stage_name(Stage::Search).is_empty());
    }
}
