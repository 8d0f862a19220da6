//! Control channel: the external asynchronous message transport used both to
//! receive operator commands / one-time codes and to report results.
//! teloxide stays inside channel::telegram; the rest of the crate sees only
//! the ControlChannel trait and the cursor-ordered Intake loop.

pub mod intake;
pub mod telegram;
pub mod transport;

pub use intake::{Intake, IntakeError};
pub use telegram::TelegramChannel;
pub use transport::{
    ChannelError, ControlChannel, Cursor, MediaAttachment, RawMessage, MAX_ATTACHMENT_BYTES,
};
