use super::types::InputTokenCount;

pub type InputTokenCountResponse = InputTokenCount;
