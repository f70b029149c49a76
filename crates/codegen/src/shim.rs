/// Environment variable naming the artifact the shim imports.
pub const ARTIFACT_ENV: &str = "MONOSERVE_ARTIFACT";

const SHIM: &str = r#"console.log = console.error;
console.info = console.error;

const isDeno = typeof globalThis.Deno != "undefined";
const artifact = isDeno ? Deno.env.get("MONOSERVE_ARTIFACT") : process.env.MONOSERVE_ARTIFACT;

const readStdin = async () => {
  if (isDeno) return await new Response(Deno.stdin.readable).text();
  const chunks = [];
  for await (const chunk of process.stdin) chunks.push(chunk);
  return Buffer.concat(chunks).toString("utf8");
};

const writeStdout = async (text) => {
  const bytes = new TextEncoder().encode(text);
  if (isDeno) {
    let written = 0;
    while (written < bytes.length) written += await Deno.stdout.write(bytes.subarray(written));
  } else {
    await new Promise((resolve) => process.stdout.write(bytes, resolve));
  }
};

const toBase64 = (bytes) => {
  let binary = "";
  for (let i = 0; i < bytes.length; i += 0x8000) {
    binary += String.fromCharCode(...bytes.subarray(i, i + 0x8000));
  }
  return btoa(binary);
};

const fromBase64 = (text) => Uint8Array.from(atob(text), (c) => c.charCodeAt(0));

const envelope = JSON.parse(await readStdin());
const { default: handler } = await import(new URL("file://" + artifact).href);

const init = { method: envelope.method, headers: envelope.headers };
if (envelope.body_base64 != null) init.body = fromBase64(envelope.body_base64);

const response = await handler(new Request(envelope.url, init));
const body = new Uint8Array(await response.arrayBuffer());

await writeStdout(JSON.stringify({
  status: response.status,
  headers: [...response.headers],
  body_base64: toBase64(body),
}));
"#;

/// Script run by the process loader: reads a request envelope on stdin,
/// invokes the artifact named by [`ARTIFACT_ENV`] and writes a response
/// envelope on stdout. Handler logging goes to stderr.
pub fn invoke_shim() -> &'static str {
    SHIM
}
