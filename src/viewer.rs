use crate::devices::{DeviceDisplayInfo, DisplayStyle};

/// Width of the rendered screen area in CSS pixels
const PREVIEW_WIDTH: u32 = 320;

/// Escape text for interpolation into HTML.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Generate the self-contained viewer document.
///
/// The page draws a CSS device frame around an `<img>` stream target and
/// runs an inline script that prefers the WebSocket feed, falling back to
/// the MJPEG stream when the socket cannot deliver frames.
pub fn render(device_name: &str, info: &DeviceDisplayInfo) -> String {
    let name = escape_html(device_name);
    let screen_width = PREVIEW_WIDTH;
    let screen_height =
        (PREVIEW_WIDTH as u64 * info.screen_height as u64 / info.screen_width as u64) as u32;
    let corner_radius =
        (info.corner_radius as u64 * PREVIEW_WIDTH as u64 / info.screen_width as u64) as u32;

    let (device_class, chrome) = match info.display_style {
        DisplayStyle::HomeButton => ("device-home-button", ""),
        DisplayStyle::Notch => ("device-notch", r#"<div class="notch"></div>"#),
        DisplayStyle::DynamicIsland => ("device-island", r#"<div class="island"></div>"#),
    };
    let home_button = if info.display_style == DisplayStyle::HomeButton {
        r#"<div class="home-button"></div>"#
    } else {
        ""
    };

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>xtool-preview &mdash; {name}</title>
    <style>
        :root {{ color-scheme: dark; }}
        body {{
            margin: 0;
            background: #17181c;
            color: #d7d9de;
            font: 14px/1.4 -apple-system, "Segoe UI", sans-serif;
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            gap: 16px;
            min-height: 100vh;
        }}
        .device {{
            position: relative;
            border: 12px solid #000;
            border-radius: {outer_radius}px;
            background: #000;
            box-shadow: 0 12px 40px rgba(0, 0, 0, 0.6);
        }}
        .device-home-button {{
            border-top-width: 56px;
            border-bottom-width: 56px;
        }}
        .screen {{
            position: relative;
            width: {screen_width}px;
            height: {screen_height}px;
            border-radius: {corner_radius}px;
            overflow: hidden;
            background: #000;
        }}
        .screen img {{
            display: block;
            width: 100%;
            height: 100%;
            object-fit: cover;
        }}
        .notch {{
            position: absolute;
            top: 12px;
            left: 50%;
            transform: translateX(-50%);
            width: 140px;
            height: 22px;
            border-radius: 0 0 14px 14px;
            background: #000;
            z-index: 2;
        }}
        .island {{
            position: absolute;
            top: 20px;
            left: 50%;
            transform: translateX(-50%);
            width: 90px;
            height: 26px;
            border-radius: 13px;
            background: #000;
            z-index: 2;
        }}
        .home-button {{
            position: absolute;
            bottom: -46px;
            left: 50%;
            transform: translateX(-50%);
            width: 36px;
            height: 36px;
            border: 2px solid #333;
            border-radius: 50%;
        }}
        .spinner {{
            position: absolute;
            top: 50%;
            left: 50%;
            width: 28px;
            height: 28px;
            margin: -14px 0 0 -14px;
            border: 3px solid #333;
            border-top-color: #d7d9de;
            border-radius: 50%;
            animation: spin 0.8s linear infinite;
        }}
        @keyframes spin {{ to {{ transform: rotate(360deg); }} }}
        .overlay {{
            position: absolute;
            inset: 0;
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            gap: 12px;
            background: rgba(0, 0, 0, 0.8);
            z-index: 3;
        }}
        .overlay button {{
            padding: 6px 18px;
            border: 1px solid #555;
            border-radius: 6px;
            background: #26272c;
            color: inherit;
            cursor: pointer;
        }}
        .hud {{
            display: flex;
            align-items: center;
            gap: 12px;
            font-variant-numeric: tabular-nums;
        }}
        .dot {{
            width: 9px;
            height: 9px;
            border-radius: 50%;
            background: #d43c3c;
        }}
        .dot.connected {{ background: #39b54a; }}
    </style>
</head>
<body class="xtool-preview">
    <div class="device {device_class}">
        {chrome}
        <div class="screen">
            <div class="spinner" id="spinner"></div>
            <img id="screen" alt="{name} screen">
            <div class="overlay" id="overlay" hidden>
                <p id="overlay-message">Disconnected</p>
                <button id="reconnect">Reconnect</button>
            </div>
        </div>
        {home_button}
    </div>
    <div class="hud">
        <span class="dot" id="status-dot"></span>
        <span>{name}</span>
        <span id="fps-counter">&ndash; fps</span>
        <span id="rate-counter">&ndash; KB/s</span>
    </div>
    <script>
        (function () {{
            const img = document.getElementById('screen');
            const spinner = document.getElementById('spinner');
            const overlay = document.getElementById('overlay');
            const overlayMessage = document.getElementById('overlay-message');
            const dot = document.getElementById('status-dot');
            const fpsCounter = document.getElementById('fps-counter');
            const rateCounter = document.getElementById('rate-counter');

            let ws = null;
            let blobUrl = null;
            let frames = 0;
            let bytes = 0;

            function setConnected(connected) {{
                dot.classList.toggle('connected', connected);
            }}

            function showFrame() {{
                spinner.hidden = true;
                overlay.hidden = true;
            }}

            function fail(message) {{
                setConnected(false);
                overlayMessage.textContent = message;
                overlay.hidden = false;
            }}

            function installBlob(blob) {{
                const next = URL.createObjectURL(blob);
                img.src = next;
                if (blobUrl) {{
                    URL.revokeObjectURL(blobUrl);
                }}
                blobUrl = next;
            }}

            function connectWebSocket() {{
                const scheme = location.protocol === 'https:' ? 'wss' : 'ws';
                let received = false;
                ws = new WebSocket(scheme + '://' + location.host + '/ws');
                ws.onmessage = (event) => {{
                    received = true;
                    frames += 1;
                    bytes += event.data.size;
                    installBlob(event.data);
                    setConnected(true);
                    showFrame();
                }};
                ws.onclose = () => {{
                    if (!received) {{
                        connectMjpeg();
                    }} else {{
                        fail('Stream closed');
                    }}
                }};
                ws.onerror = () => {{
                    ws.close();
                }};
            }}

            function connectMjpeg() {{
                img.onload = () => {{
                    setConnected(true);
                    showFrame();
                }};
                img.onerror = () => fail('Stream unavailable');
                img.src = '/stream?' + Date.now();
            }}

            function reconnect() {{
                if (ws) {{
                    ws.onclose = null;
                    ws.close();
                    ws = null;
                }}
                overlay.hidden = true;
                spinner.hidden = false;
                setConnected(false);
                connectWebSocket();
            }}

            setInterval(() => {{
                fpsCounter.textContent = frames + ' fps';
                rateCounter.textContent = (bytes / 1024).toFixed(1) + ' KB/s';
                frames = 0;
                bytes = 0;
            }}, 1000);

            document.addEventListener('keydown', (event) => {{
                if (event.key === 'r' || event.key === 'R') {{
                    reconnect();
                }}
            }});
            document.getElementById('reconnect').addEventListener('click', reconnect);

            connectWebSocket();
        }})();
    </script>
</body>
</html>
"##,
        name = name,
        device_class = device_class,
        chrome = chrome,
        home_button = home_button,
        screen_width = screen_width,
        screen_height = screen_height,
        corner_radius = corner_radius,
        outer_radius = corner_radius + 12,
    )
}
