use crate::period::{format_date_key, Period};

pub fn render_index(period: &Period) -> String {
    INDEX_HTML
        .replace("{{PERIOD}}", &period.label())
        .replace("{{START}}", &format_date_key(period.start()))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Sober Board</title>
  <style>
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #f8f3e6;
      --bg-2: #f5d3a7;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(920px, 100%);
      background: var(--card);
      backdrop-filter: blur(12px);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 28px;
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-size: clamp(2rem, 4vw, 2.8rem);
      margin: 0;
    }

    .subtitle {
      margin: 4px 0 0;
      color: #5f5c57;
    }

    form, .room-bar {
      display: flex;
      flex-wrap: wrap;
      gap: 12px;
      align-items: center;
    }

    input, select {
      border: 1px solid rgba(47, 72, 88, 0.2);
      border-radius: 14px;
      padding: 12px 14px;
      font: inherit;
    }

    button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 12px 20px;
      font: inherit;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent-2);
      color: white;
    }

    button.secondary {
      background: white;
      color: var(--accent-2);
      border: 1px solid rgba(47, 72, 88, 0.2);
    }

    .players {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(300px, 1fr));
      gap: 20px;
    }

    .player {
      background: white;
      border-radius: 18px;
      padding: 18px;
      border: 1px solid rgba(47, 72, 88, 0.08);
      display: grid;
      gap: 12px;
    }

    .player h2 {
      margin: 0;
      font-size: 1.3rem;
    }

    .stats {
      display: flex;
      gap: 16px;
      color: #8b857d;
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.08em;
    }

    .stats strong {
      display: block;
      color: var(--accent-2);
      font-size: 1.4rem;
    }

    .days {
      display: grid;
      grid-template-columns: repeat(7, 1fr);
      gap: 6px;
    }

    .day {
      aspect-ratio: 1;
      border-radius: 10px;
      display: grid;
      place-items: center;
      background: #f3eee6;
      font-size: 0.85rem;
    }

    .day.done {
      background: var(--accent);
      color: white;
    }

    .day.today {
      outline: 2px solid var(--accent-2);
    }

    .player.me .day {
      cursor: pointer;
    }

    .toast {
      position: fixed;
      bottom: 24px;
      left: 50%;
      transform: translateX(-50%);
      background: var(--ink);
      color: white;
      padding: 12px 20px;
      border-radius: 999px;
      opacity: 0;
      transition: opacity 200ms ease;
    }

    .toast.show {
      opacity: 1;
    }

    .hidden {
      display: none;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>Sober Board</h1>
      <p class="subtitle">Tracking {{PERIOD}}, one square per day.</p>
    </header>

    <section id="lobby">
      <form id="join-form">
        <input id="nickname" placeholder="Nickname" maxlength="24" required />
        <select id="avatar">
          <option value="">No token</option>
          <option value="fox">Fox</option>
          <option value="bear">Bear</option>
          <option value="owl">Owl</option>
          <option value="cat">Cat</option>
          <option value="frog">Frog</option>
          <option value="panda">Panda</option>
        </select>
        <input id="code" placeholder="Room code" maxlength="16" />
        <button type="submit">Join</button>
        <button type="button" class="secondary" id="create">Create room</button>
      </form>
    </section>

    <section id="room" class="hidden">
      <div class="room-bar">
        <span>Room <strong id="room-code"></strong></span>
        <button type="button" class="secondary" id="leave">Leave</button>
      </div>
      <div id="players" class="players"></div>
    </section>
  </main>
  <div id="toast" class="toast"></div>

  <script>
    const DEVICE_KEY = 'sober_board_device_v1';
    const periodStart = '{{START}}';
    let deviceId = localStorage.getItem(DEVICE_KEY);
    let wasLive = false;

    function toast(message) {
      const el = document.getElementById('toast');
      el.textContent = message;
      el.classList.add('show');
      setTimeout(() => el.classList.remove('show'), 2600);
    }

    async function ensureDevice() {
      if (deviceId) {
        const known = await fetch(`/api/devices/${deviceId}/dashboard`);
        if (known.ok) return deviceId;
      }
      const res = await fetch('/api/devices', { method: 'POST' });
      const body = await res.json();
      deviceId = body.device_id;
      localStorage.setItem(DEVICE_KEY, deviceId);
      return deviceId;
    }

    async function api(path, payload) {
      const res = await fetch(`/api/devices/${deviceId}/${path}`, {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(payload || {}),
      });
      if (!res.ok) {
        toast(await res.text());
        return null;
      }
      return res.status === 204 ? {} : res.json();
    }

    function lobbyPayload() {
      const avatar = document.getElementById('avatar').value;
      return {
        nickname: document.getElementById('nickname').value,
        code: document.getElementById('code').value,
        avatar: avatar || null,
      };
    }

    function render(dashboard) {
      const joined = Boolean(dashboard.room_code);
      document.getElementById('lobby').classList.toggle('hidden', joined);
      document.getElementById('room').classList.toggle('hidden', !joined);
      if (!joined) {
        wasLive = false;
        return;
      }
      if (wasLive && !dashboard.live) {
        toast('Live updates stopped. Rejoin the room to reconnect.');
      }
      wasLive = dashboard.live;

      document.getElementById('room-code').textContent = dashboard.room_code;
      const container = document.getElementById('players');
      container.innerHTML = '';
      const offset = (new Date(periodStart + 'T00:00:00').getDay() + 6) % 7;

      for (const player of dashboard.players) {
        const card = document.createElement('article');
        card.className = 'player' + (player.is_me ? ' me' : '');
        const title = document.createElement('h2');
        title.textContent = (player.avatar ? player.avatar + ' · ' : '') + player.nickname;
        const stats = document.createElement('div');
        stats.className = 'stats';
        stats.innerHTML =
          `<span><strong>${player.stats.progress}/${player.stats.period_length}</strong>progress</span>` +
          `<span><strong>${player.stats.streak}</strong>streak</span>` +
          `<span><strong>${player.stats.week_count}</strong>this week</span>`;

        const grid = document.createElement('div');
        grid.className = 'days';
        for (let i = 0; i < offset; i++) grid.appendChild(document.createElement('span'));
        dashboard.days.forEach((day, index) => {
          const cell = document.createElement('span');
          cell.className = 'day' + (player.days[index] ? ' done' : '') + (day === dashboard.today ? ' today' : '');
          cell.textContent = String(index + 1);
          if (player.is_me) {
            cell.addEventListener('click', () => api('toggle', { day }));
          }
          grid.appendChild(cell);
        });

        card.append(title, stats, grid);
        container.appendChild(card);
      }
    }

    function listen() {
      const events = new EventSource(`/api/devices/${deviceId}/events`);
      events.addEventListener('dashboard', (event) => render(JSON.parse(event.data)));
    }

    document.getElementById('join-form').addEventListener('submit', (event) => {
      event.preventDefault();
      api('join', lobbyPayload());
    });

    document.getElementById('create').addEventListener('click', () => {
      const payload = lobbyPayload();
      if (!payload.code.trim()) payload.code = null;
      api('rooms', payload);
    });

    document.getElementById('leave').addEventListener('click', () => api('leave'));

    ensureDevice().then(listen).catch(() => toast('Could not reach the board'));
  </script>
</body>
</html>
"#;
