/// Bare specifier user modules import `fn`, `fnRaw` and `fnWebSocket` from.
pub const HELPERS_MODULE_ID: &str = "monoserve";

const HELPERS: &str = r#"const isSchema = (value) => typeof value?.["~standard"]?.validate == "function";

export function fn(first, second) {
  if (typeof first == "function") {
    return { kind: "fn", inner: first, schema: isSchema(second) ? second : undefined };
  }
  if (first === undefined) {
    return { kind: "fn", inner: () => undefined };
  }
  return { kind: "fn", schema: first, inner: second };
}

export function fnRaw(inner) {
  return { kind: "raw", inner };
}

export function fnWebSocket(inner) {
  return { kind: "websocket", inner };
}
"#;

/// Registration helpers. Each returns a `{ kind, schema?, inner }`
/// descriptor that the server wrapper unpacks.
pub fn helpers_module() -> &'static str {
    HELPERS
}
