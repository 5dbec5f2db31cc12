use std::collections::BTreeMap;

use gloo_timers::callback::Timeout;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{js_sys, spawn_local, JsFuture};
use web_sys::{File, HtmlInputElement};
use yew::prelude::*;

use rivalroll_shared::{
    ActionResponse, CatalogResponse, ErrorBody, PlayerView, RosterResponse, SessionView,
    SetDefaultRequest, SetDefaultResponse, UploadResponse,
};

/// Poll cadence while a reel is moving; matches the fastest reel update.
const POLL_MS: u32 = 50;
const PLACEHOLDER: &str = "?";

fn backend() -> &'static str {
    option_env!("BACKEND_URL").unwrap_or("http://127.0.0.1:8080")
}

fn unreachable(err: reqwest::Error) -> String {
    format!("server unreachable: {err}")
}

/// Decodes a success body, or the server's `{ error }` message otherwise.
async fn reply<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, String> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|err| err.to_string());
    }
    Err(resp
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string()))
}

async fn get_json<T: DeserializeOwned>(path: &str) -> Result<T, String> {
    let resp = reqwest::Client::new()
        .get(format!("{}{}", backend(), path))
        .send()
        .await
        .map_err(unreachable)?;
    reply(resp).await
}

async fn fetch_session() -> Option<SessionView> {
    get_json("/session").await.ok()
}

async fn post_action(path: &str) -> Option<ActionResponse> {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", backend(), path))
        .send()
        .await
        .ok()?;
    resp.json::<ActionResponse>().await.ok()
}

struct PickedFile {
    name: String,
    mime: String,
    bytes: Vec<u8>,
}

async fn read_file(file: File) -> Result<PickedFile, String> {
    let buf = JsFuture::from(file.array_buffer())
        .await
        .map_err(|_| format!("could not read {}", file.name()))?;
    Ok(PickedFile {
        name: file.name(),
        mime: file.type_(),
        bytes: js_sys::Uint8Array::new(&buf).to_vec(),
    })
}

async fn file_form(file: File) -> Result<Form, String> {
    let file = read_file(file).await?;
    let mut part = Part::bytes(file.bytes).file_name(file.name);
    if !file.mime.is_empty() {
        part = part.mime_str(&file.mime).map_err(|err| err.to_string())?;
    }
    Ok(Form::new().part("file", part))
}

/// Takes the chosen file and clears the input so the same file can be picked again.
fn picked_file(e: &Event) -> Option<File> {
    let input = e.target_dyn_into::<HtmlInputElement>()?;
    let file = input.files()?.get(0);
    input.set_value("");
    file
}

/// `/icons/{name}` with everything outside the unreserved set percent-encoded.
pub fn icon_path(name: &str) -> String {
    let mut path = String::from("/icons/");
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                path.push(byte as char)
            }
            _ => path.push_str(&format!("%{byte:02X}")),
        }
    }
    path
}

async fn upload_icon(name: &str, file: File) -> Result<SessionView, String> {
    let form = file_form(file).await?;
    let resp = reqwest::Client::new()
        .post(format!("{}{}", backend(), icon_path(name)))
        .multipart(form)
        .send()
        .await
        .map_err(unreachable)?;
    reply(resp).await
}

async fn remove_icon(name: &str) -> Result<SessionView, String> {
    let resp = reqwest::Client::new()
        .delete(format!("{}{}", backend(), icon_path(name)))
        .send()
        .await
        .map_err(unreachable)?;
    reply(resp).await
}

async fn sync_catalog() -> Result<CatalogResponse, String> {
    let resp = reqwest::Client::new()
        .post(format!("{}/characters/sync", backend()))
        .send()
        .await
        .map_err(unreachable)?;
    reply(resp).await
}

async fn upload_catalog_image(key: &str, file: File) -> Result<UploadResponse, String> {
    let form = file_form(file).await?;
    let resp = reqwest::Client::new()
        .post(format!("{}/characters/upload", backend()))
        .bearer_auth(key)
        .multipart(form)
        .send()
        .await
        .map_err(unreachable)?;
    reply(resp).await
}

async fn set_default_character(key: &str, id: String) -> Result<SetDefaultResponse, String> {
    let resp = reqwest::Client::new()
        .post(format!("{}/characters/default", backend()))
        .bearer_auth(key)
        .json(&SetDefaultRequest {
            character_id: Some(id),
        })
        .send()
        .await
        .map_err(unreachable)?;
    reply(resp).await
}

/// First letters of the first two words; the fallback when no icon is set.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .collect()
}

#[derive(Properties, PartialEq)]
struct CharacterProps {
    name: Option<String>,
    icon: Option<String>,
    #[prop_or_default]
    center: bool,
}

#[function_component(CharacterTile)]
fn character_tile(props: &CharacterProps) -> Html {
    let class = classes!("tile", props.center.then_some("tile-center"));
    match (&props.name, &props.icon) {
        (Some(name), Some(src)) => html! {
            <div {class} title={name.clone()}><img src={src.clone()} alt={name.clone()} /></div>
        },
        (Some(name), None) => html! {
            <div {class} title={name.clone()}><span class="initials">{initials(name)}</span></div>
        },
        (None, _) => html! { <div {class}><span class="initials">{PLACEHOLDER}</span></div> },
    }
}

#[derive(Properties, PartialEq)]
struct PanelProps {
    player: PlayerView,
    icons: BTreeMap<String, String>,
    on_action: Callback<String>,
}

#[function_component(PlayerPanel)]
fn player_panel(props: &PanelProps) -> Html {
    let p = &props.player;
    let icon = |name: &Option<String>| name.as_ref().and_then(|n| props.icons.get(n).cloned());
    let spin_disabled = p.spinning || p.exhausted;

    let on_spin = {
        let on_action = props.on_action.clone();
        let path = format!("/session/spin/{}", p.id);
        Callback::from(move |_: MouseEvent| on_action.emit(path.clone()))
    };
    let on_skip = {
        let on_action = props.on_action.clone();
        let path = format!("/session/skip/{}", p.id);
        Callback::from(move |_: MouseEvent| on_action.emit(path.clone()))
    };

    html! {
        <section class="player" style={format!("--accent: {}", p.color)}>
            <h2>{&p.display_name}</h2>
            <div class="slots">
                <CharacterTile name={p.window.left.clone()} icon={icon(&p.window.left)} />
                <CharacterTile name={p.window.center.clone()} icon={icon(&p.window.center)} center=true />
                <CharacterTile name={p.window.right.clone()} icon={icon(&p.window.right)} />
            </div>
            <p class="selection">{p.selection.clone().unwrap_or_else(|| PLACEHOLDER.to_string())}</p>
            <div class="actions">
                <button onclick={on_spin} disabled={spin_disabled}>
                    { if p.spinning { "Spinning..." } else if p.exhausted { "No characters left" } else { "Spin" } }
                </button>
                <button onclick={on_skip} disabled={p.spinning || p.selection.is_none()}>{"Skip"}</button>
            </div>
            <ol class="history">
                { for p.history.iter().map(|h| html! {
                    <li>
                        <span>{&h.character_name}</span>
                        <small>{h.at().map(|at| at.format("%H:%M:%S").to_string()).unwrap_or_default()}</small>
                    </li>
                }) }
            </ol>
        </section>
    }
}

#[derive(Properties, PartialEq)]
struct IconsProps {
    roster: Vec<String>,
    icons: BTreeMap<String, String>,
    on_session: Callback<SessionView>,
    on_message: Callback<Option<String>>,
}

#[function_component(IconsPanel)]
fn icons_panel(props: &IconsProps) -> Html {
    let rows = props.roster.iter().map(|name| {
        let icon = props.icons.get(name).cloned();
        let on_pick = {
            let name = name.clone();
            let on_session = props.on_session.clone();
            let on_message = props.on_message.clone();
            Callback::from(move |e: Event| {
                let Some(file) = picked_file(&e) else { return };
                let name = name.clone();
                let on_session = on_session.clone();
                let on_message = on_message.clone();
                spawn_local(async move {
                    match upload_icon(&name, file).await {
                        Ok(view) => {
                            on_session.emit(view);
                            on_message.emit(Some(format!("Icon set for {name}")));
                        }
                        Err(err) => on_message.emit(Some(err)),
                    }
                });
            })
        };
        let on_remove = {
            let name = name.clone();
            let on_session = props.on_session.clone();
            let on_message = props.on_message.clone();
            Callback::from(move |_: MouseEvent| {
                let name = name.clone();
                let on_session = on_session.clone();
                let on_message = on_message.clone();
                spawn_local(async move {
                    match remove_icon(&name).await {
                        Ok(view) => {
                            on_session.emit(view);
                            on_message.emit(Some(format!("Icon removed for {name}")));
                        }
                        Err(err) => on_message.emit(Some(err)),
                    }
                });
            })
        };
        let has_icon = icon.is_some();
        html! {
            <li key={name.clone()}>
                <CharacterTile name={Some(name.clone())} {icon} />
                <span>{name}</span>
                <input type="file" accept="image/*" onchange={on_pick} />
                if has_icon { <button onclick={on_remove}>{"Remove"}</button> }
            </li>
        }
    });

    html! {
        <section class="icons">
            <h2>{"Icons"}</h2>
            <ul>{ for rows }</ul>
        </section>
    }
}

#[derive(Properties, PartialEq)]
struct CatalogProps {
    on_message: Callback<Option<String>>,
}

#[function_component(CatalogPanel)]
fn catalog_panel(props: &CatalogProps) -> Html {
    let catalog = use_state(|| None as Option<CatalogResponse>);
    let key = use_state(String::new);

    // true runs an explicit sync and reports its message
    let reload = {
        let catalog = catalog.clone();
        let on_message = props.on_message.clone();
        Callback::from(move |sync: bool| {
            let catalog = catalog.clone();
            let on_message = on_message.clone();
            spawn_local(async move {
                let result = if sync {
                    sync_catalog().await
                } else {
                    get_json::<CatalogResponse>("/characters/upload").await
                };
                match result {
                    Ok(resp) => {
                        if sync {
                            on_message.emit(resp.message.clone());
                        }
                        catalog.set(Some(resp));
                    }
                    Err(err) => on_message.emit(Some(err)),
                }
            });
        })
    };

    {
        let reload = reload.clone();
        use_effect_with((), move |_| reload.emit(false));
    }

    let on_key = {
        let key = key.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                key.set(input.value());
            }
        })
    };

    let on_sync = {
        let reload = reload.clone();
        Callback::from(move |_: MouseEvent| reload.emit(true))
    };

    let on_upload = {
        let key = key.clone();
        let reload = reload.clone();
        let on_message = props.on_message.clone();
        Callback::from(move |e: Event| {
            let Some(file) = picked_file(&e) else { return };
            let key = (*key).clone();
            let reload = reload.clone();
            let on_message = on_message.clone();
            spawn_local(async move {
                match upload_catalog_image(&key, file).await {
                    Ok(resp) => {
                        on_message.emit(Some(resp.message));
                        reload.emit(false);
                    }
                    Err(err) => on_message.emit(Some(err)),
                }
            });
        })
    };

    let make_default = |id: String| {
        let key = (*key).clone();
        let reload = reload.clone();
        let on_message = props.on_message.clone();
        Callback::from(move |_: MouseEvent| {
            let key = key.clone();
            let id = id.clone();
            let reload = reload.clone();
            let on_message = on_message.clone();
            spawn_local(async move {
                match set_default_character(&key, id).await {
                    Ok(resp) => {
                        on_message.emit(Some(resp.message));
                        reload.emit(false);
                    }
                    Err(err) => on_message.emit(Some(err)),
                }
            });
        })
    };

    let characters = (*catalog)
        .as_ref()
        .map(|c| c.characters.clone())
        .unwrap_or_default();

    html! {
        <section class="catalog">
            <h2>{"Character images"}</h2>
            <div class="actions">
                <input type="password" placeholder="API key" value={(*key).clone()} oninput={on_key} />
                <input type="file" accept=".webp,image/webp" onchange={on_upload} />
                <button onclick={on_sync}>{"Sync"}</button>
            </div>
            <ul>
                { for characters.iter().map(|c| html! {
                    <li key={c.id.clone()}>
                        <span>{&c.name}</span>
                        <small>{&c.filename}</small>
                        if c.is_default {
                            <strong>{"default"}</strong>
                        } else {
                            <button onclick={make_default(c.id.clone())}>{"Make default"}</button>
                        }
                    </li>
                }) }
            </ul>
        </section>
    }
}

#[function_component(App)]
fn app() -> Html {
    let session = use_state(|| None as Option<SessionView>);
    let roster = use_state(Vec::<String>::new);
    let message = use_state(|| None as Option<String>);
    let polls = use_state(|| 0u32);

    {
        let session = session.clone();
        let roster = roster.clone();
        use_effect_with((), move |_| {
            spawn_local(async move {
                session.set(fetch_session().await);
                if let Ok(resp) = get_json::<RosterResponse>("/roster").await {
                    roster.set(resp.characters);
                }
            });
        });
    }

    // Keep polling while any reel moves; each poll bumps the counter so the
    // effect re-arms even when the frame did not change.
    {
        let session = session.clone();
        let polls = polls.clone();
        let deps = ((*session).clone(), *polls);
        use_effect_with(deps, move |(current, count)| {
            let timeout = current
                .as_ref()
                .filter(|s| s.any_spinning())
                .map(|_| {
                    let next = count.wrapping_add(1);
                    Timeout::new(POLL_MS, move || {
                        spawn_local(async move {
                            if let Some(view) = fetch_session().await {
                                session.set(Some(view));
                            }
                            polls.set(next);
                        });
                    })
                });
            move || drop(timeout)
        });
    }

    let on_action = {
        let session = session.clone();
        let message = message.clone();
        Callback::from(move |path: String| {
            let session = session.clone();
            let message = message.clone();
            spawn_local(async move {
                match post_action(&path).await {
                    Some(resp) => {
                        message.set(resp.message);
                        session.set(Some(resp.session));
                    }
                    None => message.set(Some("server unreachable".into())),
                }
            });
        })
    };

    let on_spin_both = {
        let on_action = on_action.clone();
        Callback::from(move |_: MouseEvent| on_action.emit("/session/spin-both".into()))
    };

    let on_purge = {
        let on_action = on_action.clone();
        Callback::from(move |_: MouseEvent| {
            let confirmed = web_sys::window()
                .and_then(|w| w.confirm_with_message("Clear both histories?").ok())
                .unwrap_or(false);
            if confirmed {
                on_action.emit("/session/purge".into());
            }
        })
    };

    let on_session = {
        let session = session.clone();
        Callback::from(move |view: SessionView| session.set(Some(view)))
    };
    let on_message = {
        let message = message.clone();
        Callback::from(move |msg: Option<String>| message.set(msg))
    };

    let Some(view) = (*session).clone() else {
        return html! { <main><h1>{"Rivalroll"}</h1><p>{"Loading session..."}</p></main> };
    };
    let both_disabled = view.any_spinning() || view.available.len() < 2;

    html! {
        <main>
            <h1>{"Rivalroll"}</h1>
            <div class="players">
                { for view.players.iter().map(|p| html! {
                    <PlayerPanel
                        player={p.clone()}
                        icons={view.icons.clone()}
                        on_action={on_action.clone()}
                    />
                }) }
            </div>
            <div class="global">
                <button onclick={on_spin_both} disabled={both_disabled}>{"Spin Both"}</button>
                <button onclick={on_purge} disabled={view.any_spinning()}>{"Purge"}</button>
                <span>{format!("{} left", view.available.len())}</span>
            </div>
            if let Some(msg) = &*message { <p class="message">{msg}</p> }
            <section class="available">
                <h2>{format!("Available ({})", view.available.len())}</h2>
                <ul>
                    { for view.available.iter().map(|name| html! { <li key={name.clone()}>{name}</li> }) }
                </ul>
            </section>
            <IconsPanel
                roster={(*roster).clone()}
                icons={view.icons.clone()}
                on_session={on_session}
                on_message={on_message.clone()}
            />
            <CatalogPanel {on_message} />
        </main>
    }
}

#[wasm_bindgen(start)]
pub fn run() {
    yew::Renderer::<App>::new().render();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_paths_are_percent_encoded() {
        assert_eq!(icon_path("Groot"), "/icons/Groot");
        assert_eq!(icon_path("Cloak & Dagger"), "/icons/Cloak%20%26%20Dagger");
        assert_eq!(icon_path("Mr. Fantastic"), "/icons/Mr.%20Fantastic");
        assert_eq!(icon_path("Jeff/?"), "/icons/Jeff%2F%3F");
    }

    #[test]
    fn initials_take_two_words() {
        assert_eq!(initials("Doctor Strange"), "DS");
        assert_eq!(initials("Cloak & Dagger"), "C&");
        assert_eq!(initials("the thing"), "tt");
        assert_eq!(initials("Groot"), "G");
        assert_eq!(initials("  "), "");
    }
}
