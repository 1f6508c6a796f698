//! The single HTML page: an editor pre-filled with an example and two buttons.

const TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>kiln</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 16px; }
    textarea { width: 100%; height: 300px; font-family: monospace; }
    pre { background: #111; color: #eee; padding: 12px; white-space: pre-wrap; max-height: 400px; overflow: auto; }
    .row { display: flex; gap: 8px; margin-top: 8px; }
  </style>
</head>
<body>
  <h2>kiln</h2>
  <textarea id="code" spellcheck="false">{{example}}</textarea>
  <div class="row">
    <button type="button" onclick="runWith('run')">Run</button>
    <button type="button" onclick="runWith('ir')">Compile (IR only)</button>
  </div>

  <h3>Output</h3>
  <pre id="out"></pre>

<script>
async function runWith(mode) {
  const out = document.getElementById("out");
  out.textContent = "running...";
  let res;
  try {
    res = await fetch("/run", {
      method: "POST",
      headers: {"Content-Type": "application/json"},
      body: JSON.stringify({ src: document.getElementById("code").value, mode: mode })
    });
  } catch (e) {
    out.textContent = "request failed: " + e;
    return;
  }
  if (!res.ok) {
    out.textContent = "error " + res.status + ": " + await res.text();
    return;
  }
  const j = await res.json();
  out.textContent = j.stdout + "\n" + j.stderr;
}
</script>
</body>
</html>
"#;

/// Render the page with `example` in the editor.
pub fn render(example: &str) -> String {
    TEMPLATE.replace("{{example}}", &escape_html(example))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
