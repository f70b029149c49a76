use std::path::Path;

use remote_core::{Codec, Mode, js_string};

/// Virtual id the wrapper is bundled under.
pub const SERVER_ENTRY_ID: &str = "monoserve:entry";

const PRELUDE: &str = r#"const text = (body, status) =>
  new Response(body, { status, headers: { "content-type": "text/plain;charset=UTF-8" } });
"#;

/// Entry module wrapping the remote module at `module_path` as a
/// `(Request) => Promise<Response>` default export.
pub fn server_wrapper(mode: &Mode, module_path: &Path) -> String {
    let import = js_string(&module_path.to_string_lossy().replace('\\', "/"));
    match mode {
        Mode::Websocket => websocket_wrapper(&import),
        Mode::Function { input, output } => function_wrapper(&import, *input, *output),
    }
}

fn unwrap_remote(kind: &str) -> String {
    format!(
        r#"const {{ schema, inner }} = typeof remote == "function" ? {{ inner: remote }} : remote ?? {{}};
if (typeof inner != "function") {{
  throw new TypeError("remote module must default-export a function registered with {kind}()");
}}
"#
    )
}

fn function_wrapper(import: &str, input: Codec, output: Codec) -> String {
    let mut js = format!("import remote from {};\n", import);
    let devalue = match (input == Codec::Devalue, output == Codec::Devalue) {
        (true, true) => Some("stringify, parse"),
        (true, false) => Some("parse"),
        (false, true) => Some("stringify"),
        (false, false) => None,
    };
    if let Some(names) = devalue {
        js.push_str(&format!("import {{ {} }} from \"devalue\";\n", names));
    }
    js.push('\n');
    let helper = if input == Codec::Manual && output == Codec::Manual {
        "fnRaw"
    } else {
        "fn"
    };
    js.push_str(&unwrap_remote(helper));
    if input != Codec::Manual {
        js.push_str(
            r#"if (typeof schema?.["~standard"]?.validate != "function") {
  throw new TypeError("remote function taking input must be registered with a Standard Schema");
}
"#,
        );
    }
    js.push('\n');
    js.push_str(PRELUDE);

    let decode = match input {
        Codec::Json => Some("JSON.parse(body)"),
        Codec::Devalue => Some("parse(body)"),
        Codec::Manual => None,
    };
    let call = match decode {
        Some(decode) => format!(
            r#"    let arg;
    try {{
      const body = await req.text();
      arg = body == "" ? undefined : {decode};
    }} catch (err) {{
      console.error("Malformed input:", err);
      return text("Invalid input", 400);
    }}

    const checked = await schema["~standard"].validate(arg);
    if (checked.issues) {{
      console.error("Invalid input:", checked.issues);
      return text("Invalid input", 400);
    }}

    const result = await inner(checked.value);
"#
        ),
        None => "    const result = await inner(req);\n".to_string(),
    };

    let respond = match output {
        Codec::Json => {
            r#"    return new Response(JSON.stringify(result ?? null), {
      headers: { "content-type": "application/json" },
    });
"#
        }
        Codec::Devalue => {
            r#"    return new Response(stringify(result), {
      headers: { "content-type": "application/json" },
    });
"#
        }
        Codec::Manual => {
            r#"    if (!(result instanceof Response)) {
      throw new TypeError("remote function must return a Response");
    }
    return result;
"#
        }
    };

    js.push_str(&format!(
        r#"
export default async function (req) {{
  if (req.method != "POST") {{
    return new Response("Method not allowed", {{ status: 405, headers: {{ allow: "POST" }} }});
  }}

  try {{
{call}
{respond}  }} catch (err) {{
    console.error(err);
    return text("Internal server error", 500);
  }}
}}
"#
    ));
    js
}

fn websocket_wrapper(import: &str) -> String {
    let mut js = format!("import remote from {};\n\n", import);
    js.push_str(&unwrap_remote("fnWebSocket"));
    js.push('\n');
    js.push_str(PRELUDE);
    js.push_str(
        r#"
export default async function (req) {
  if (req.method != "GET" || req.headers.get("upgrade")?.toLowerCase() != "websocket") {
    return new Response("Method not allowed", { status: 405, headers: { allow: "GET" } });
  }

  try {
    const { socket, response } = Deno.upgradeWebSocket(req);
    Promise.resolve()
      .then(() => inner(socket, req))
      .catch((err) => {
        console.error("WebSocket handler failed:", err);
        socket.close(1011, "Internal server error");
      });
    return response;
  } catch (err) {
    console.error(err);
    return text("Internal server error", 500);
  }
}
"#,
    );
    js
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(mode: Mode) -> String {
        server_wrapper(&mode, Path::new("/app/src/echo.remote.ts"))
    }

    #[test]
    fn json_wrapper_validates_then_serializes() {
        let js = wrap(Mode::function(Codec::Json, Codec::Json));
        assert!(js.starts_with("import remote from \"/app/src/echo.remote.ts\";\n\n"));
        assert!(js.contains("arg = body == \"\" ? undefined : JSON.parse(body);"));
        assert!(js.contains("schema[\"~standard\"].validate(arg)"));
        assert!(js.contains("return text(\"Invalid input\", 400);"));
        assert!(js.contains("JSON.stringify(result ?? null)"));
        assert!(js.contains("return text(\"Internal server error\", 500);"));
        assert!(js.contains("status: 405"));
        assert!(!js.contains("devalue"));
    }

    #[test]
    fn schema_is_required_unless_input_is_manual() {
        let json = wrap(Mode::function(Codec::Json, Codec::Manual));
        assert!(json.contains("must be registered with a Standard Schema"));

        let manual = wrap(Mode::function(Codec::Manual, Codec::Json));
        assert!(!manual.contains("Standard Schema"));
        assert!(manual.contains("const result = await inner(req);"));
        assert!(!manual.contains("Invalid input"));
    }

    #[test]
    fn manual_output_must_be_a_response() {
        let js = wrap(Mode::function(Codec::Manual, Codec::Manual));
        assert!(js.contains("if (!(result instanceof Response))"));
        assert!(js.contains("registered with fnRaw()"));
    }

    #[test]
    fn devalue_codecs_use_devalue() {
        let js = wrap(Mode::function(Codec::Devalue, Codec::Devalue));
        assert!(js.contains("import { stringify, parse } from \"devalue\";"));
        assert!(js.contains("undefined : parse(body);"));
        assert!(js.contains("new Response(stringify(result)"));

        let output_only = wrap(Mode::function(Codec::Json, Codec::Devalue));
        assert!(output_only.contains("import { stringify } from \"devalue\";"));
    }

    #[test]
    fn websocket_wrapper_upgrades_and_closes_on_error() {
        let js = wrap(Mode::Websocket);
        assert!(js.contains("Deno.upgradeWebSocket(req)"));
        assert!(js.contains("socket.close(1011"));
        assert!(js.contains("allow: \"GET\""));
        assert!(!js.contains("req.text()"));
    }

    #[test]
    fn windows_paths_are_normalized() {
        let js = server_wrapper(&Mode::default(), Path::new(r"C:\app\a.remote.ts"));
        assert!(js.starts_with("import remote from \"C:/app/a.remote.ts\";"));
    }
}
