use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Not enough free space on the page")]
    PageFull,
    #[error("Slot {0} is out of range")]
    SlotOutOfRange(u16),
    #[error("Slot {0} holds no live tuple")]
    SlotDead(u16),
    #[error("Payload of {0} bytes can never fit in a page")]
    PayloadTooLarge(usize),
}
