use remote_core::{Codec, Mode, js_string};

/// Source of the module that stands in for a remote module on the client.
pub fn client_stub(url: &str, mode: &Mode) -> String {
    match mode {
        Mode::Websocket => websocket_client(url),
        Mode::Function { input, output } => function_client(url, *input, *output),
    }
}

fn websocket_client(url: &str) -> String {
    format!(
        r#"const path = {url};

export default function (protocols) {{
  const url = new URL(path, globalThis.location?.href);
  url.protocol = url.protocol == "https:" ? "wss:" : "ws:";
  return new WebSocket(url, protocols);
}}
"#,
        url = js_string(url)
    )
}

fn function_client(url: &str, input: Codec, output: Codec) -> String {
    let mut js = String::new();
    if input == Codec::Devalue || output == Codec::Devalue {
        let imports = match (input == Codec::Devalue, output == Codec::Devalue) {
            (true, true) => "stringify, parse",
            (true, false) => "stringify",
            _ => "parse",
        };
        js.push_str(&format!("import {{ {} }} from \"devalue\";\n\n", imports));
    }
    js.push_str(&format!("const url = {};\n\n", js_string(url)));

    let (params, request) = match input {
        Codec::Manual => ("init = {}", "{ ...init, method: \"POST\" }".to_string()),
        Codec::Json => (
            "arg, init = {}",
            "{\n    ...init,\n    method: \"POST\",\n    headers: jsonHeaders(init.headers),\n    body: JSON.stringify(arg),\n  }"
                .to_string(),
        ),
        Codec::Devalue => (
            "arg, init = {}",
            "{\n    ...init,\n    method: \"POST\",\n    body: stringify(arg),\n  }".to_string(),
        ),
    };

    if input == Codec::Json {
        js.push_str(
            r#"const jsonHeaders = (init) => {
  const headers = new Headers(init);
  headers.set("content-type", "application/json");
  return headers;
};

"#,
        );
    }

    let result = match output {
        Codec::Json => "return await res.json();",
        Codec::Devalue => "return parse(await res.text());",
        Codec::Manual => "return res;",
    };

    js.push_str(&format!(
        r#"export default async function ({params}) {{
  const res = await fetch(url, {request});

  if (!res.ok) {{
    throw new Error(await res.text());
  }}

  {result}
}}
"#
    ));
    js
}
