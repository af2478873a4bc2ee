//! Tasks - 業務タスクのペイロードと handler
//!
//! 実際の送信処理（SMTP など）は port の向こう側に置き、ここでは
//! ペイロードの形と handler の振る舞いだけを持つ。

pub mod mail;

pub use self::mail::{MAIL_SEND_KIND, MailError, MailSendHandler, MailTask, Mailer};
