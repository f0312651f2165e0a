//! Browser sessions and full-page screenshots.

pub mod assembler;
pub mod canvas;
pub mod mock;
pub mod session;
pub mod webdriver;

pub use assembler::ScreenshotAssembler;
pub use canvas::PageCanvas;
pub use mock::{MockLauncher, MockPage, MockSession, SessionLog};
pub use session::{CaptureSession, HttpResponse, SessionLauncher, Side, WaitCondition, wait_until};
pub use webdriver::{WebDriverLauncher, WebDriverSession};
