//! Translator Registry (spec §4.1): a thin string-keyed lookup over the
//! existing dialect-pair transform functions in [`crate::middleware`], so
//! the conductor can resolve a `(src, dst, op)` triple parsed straight off
//! request routing (HTTP path segments, CLI flags) without matching on the
//! typed [`Proto`]/[`Op`] enums itself.

use crate::middleware::{
    Op, Proto, Request, Response, StreamFormat, TransformContext, TransformError, stream_format,
    transform_request, transform_response,
};

/// Error returned when a string name doesn't map to a known [`Proto`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProto(pub String);

/// Parses a dialect name as used in routing/config (`"claude"`, `"openai"`,
/// `"openai_chat"`, `"openai_response"`, `"gemini"`) into a [`Proto`].
pub fn parse_proto(name: &str) -> Result<Proto, UnknownProto> {
    match name {
        "claude" => Ok(Proto::Claude),
        "openai" => Ok(Proto::OpenAI),
        "openai_chat" => Ok(Proto::OpenAIChat),
        "openai_response" => Ok(Proto::OpenAIResponse),
        "gemini" => Ok(Proto::Gemini),
        other => Err(UnknownProto(other.to_string())),
    }
}

/// A registered translator: the `(src, dst, op)` triple a caller resolved
/// by name, ready to drive [`transform_request`]/[`transform_response`].
#[derive(Debug, Clone, Copy)]
pub struct Translator {
    ctx: TransformContext,
}

impl Translator {
    /// Looks up a translator by dialect name and operation. Both `src_op`
    /// and `dst_op` are set to `op`; use [`Translator::for_ops`] when the
    /// request and response legs of a call use different ops (e.g. a
    /// streamed request answered as a single accumulated response).
    pub fn lookup(src: &str, dst: &str, op: Op) -> Result<Self, UnknownProto> {
        Self::for_ops(src, dst, op, op)
    }

    pub fn for_ops(
        src: &str,
        dst: &str,
        src_op: Op,
        dst_op: Op,
    ) -> Result<Self, UnknownProto> {
        let src = parse_proto(src)?;
        let dst = parse_proto(dst)?;
        Ok(Translator {
            ctx: TransformContext {
                src,
                dst,
                src_op,
                dst_op,
            },
        })
    }

    pub fn context(&self) -> &TransformContext {
        &self.ctx
    }

    /// `true` when source and destination dialect/op are identical, i.e.
    /// the translator is a no-op pass-through.
    pub fn is_identity(&self) -> bool {
        self.ctx.src == self.ctx.dst && self.ctx.src_op == self.ctx.dst_op
    }

    pub fn transform_request(&self, req: Request) -> Result<Request, TransformError> {
        if self.is_identity() {
            return Ok(req);
        }
        transform_request(&self.ctx, req)
    }

    pub fn transform_response(&self, resp: Response) -> Result<Response, TransformError> {
        if self.is_identity() {
            return Ok(resp);
        }
        transform_response(&self.ctx, resp)
    }

    /// SSE/JSON-stream framing expected on the destination dialect, if it
    /// streams at all.
    pub fn dst_stream_format(&self) -> Option<StreamFormat> {
        stream_format(self.ctx.dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_dialect_names() {
        assert_eq!(parse_proto("claude"), Ok(Proto::Claude));
        assert_eq!(parse_proto("openai_chat"), Ok(Proto::OpenAIChat));
        assert!(parse_proto("bogus").is_err());
    }

    #[test]
    fn identity_lookup_is_identity() {
        let t = Translator::lookup("claude", "claude", Op::GenerateContent).unwrap();
        assert!(t.is_identity());
    }

    #[test]
    fn cross_dialect_lookup_is_not_identity() {
        let t = Translator::lookup("claude", "gemini", Op::GenerateContent).unwrap();
        assert!(!t.is_identity());
        assert_eq!(t.dst_stream_format(), Some(StreamFormat::JsonStream));
    }

    #[test]
    fn unknown_dialect_name_is_rejected() {
        let err = Translator::lookup("claude", "nope", Op::GenerateContent).unwrap_err();
        assert_eq!(err, UnknownProto("nope".to_string()));
    }
}
