//! Scripted rendering engine for exercising sessions, browser handling and runs
//! without a real Chrome.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{ClientIdentity, LaunchSettings, RenderingEngine};
use crate::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Loads,
    TimesOut,
    Disconnects,
}

#[derive(Debug, Clone)]
pub struct PageScript {
    pub navigation: Navigation,
    pub marker_present: bool,
    pub html: String,
    pub final_url: Option<String>,
}

impl PageScript {
    pub fn product(title: &str, price: &str) -> Self {
        Self {
            navigation: Navigation::Loads,
            marker_present: true,
            html: format!(
                r#"<html><body><span id="productTitle">{}</span>
                   <span class="a-price"><span class="a-offscreen">₹{}</span></span></body></html>"#,
                title, price
            ),
            final_url: None,
        }
    }

    pub fn untitled(price: &str) -> Self {
        Self {
            navigation: Navigation::Loads,
            marker_present: false,
            html: format!(
                r#"<html><body><div class="a-price"><span class="a-offscreen">{}</span></div></body></html>"#,
                price
            ),
            final_url: None,
        }
    }

    pub fn captcha() -> Self {
        Self {
            navigation: Navigation::Loads,
            marker_present: false,
            html: r#"<html><body><form action="/errors/validateCaptcha">
                     <h4>Enter the characters you see below</h4></form></body></html>"#
                .to_string(),
            final_url: Some("https://www.amazon.in/errors/validateCaptcha".to_string()),
        }
    }

    pub fn priceless(title: &str) -> Self {
        Self {
            navigation: Navigation::Loads,
            marker_present: true,
            html: format!(r#"<html><body><span id="productTitle">{}</span></body></html>"#, title),
            final_url: None,
        }
    }

    pub fn timeout() -> Self {
        Self {
            navigation: Navigation::TimesOut,
            marker_present: false,
            html: String::new(),
            final_url: None,
        }
    }

    pub fn disconnect() -> Self {
        Self {
            navigation: Navigation::Disconnects,
            marker_present: false,
            html: String::new(),
            final_url: None,
        }
    }
}

#[derive(Debug)]
pub struct FakeBrowser {
    pub id: u32,
}

#[derive(Debug)]
pub struct FakePage {
    pub browser_id: u32,
    url: Mutex<Option<String>>,
}

#[derive(Default)]
struct State {
    scripts: HashMap<String, PageScript>,
    launch_attempts: u32,
    launches: u32,
    failing_launches: u32,
    disconnected: HashSet<u32>,
    browsers_closed: Vec<u32>,
    fail_browser_close: bool,
    pages_opened: u32,
    pages_closed: u32,
    navigations: Vec<String>,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, script: PageScript) {
        self.state.lock().unwrap().scripts.insert(url.to_string(), script);
    }

    pub fn fail_launches(&self, count: u32) {
        self.state.lock().unwrap().failing_launches = count;
    }

    pub fn fail_browser_close(&self) {
        self.state.lock().unwrap().fail_browser_close = true;
    }

    pub fn disconnect(&self, browser_id: u32) {
        self.state.lock().unwrap().disconnected.insert(browser_id);
    }

    pub fn launches(&self) -> u32 {
        self.state.lock().unwrap().launches
    }

    pub fn launch_attempts(&self) -> u32 {
        self.state.lock().unwrap().launch_attempts
    }

    pub fn browsers_closed(&self) -> usize {
        self.state.lock().unwrap().browsers_closed.len()
    }

    pub fn closed_browser_ids(&self) -> Vec<u32> {
        self.state.lock().unwrap().browsers_closed.clone()
    }

    pub fn pages_opened(&self) -> u32 {
        self.state.lock().unwrap().pages_opened
    }

    pub fn pages_closed(&self) -> u32 {
        self.state.lock().unwrap().pages_closed
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    fn script_for(&self, page: &FakePage) -> Option<PageScript> {
        let url = page.url.lock().unwrap().clone()?;
        self.state.lock().unwrap().scripts.get(&url).cloned()
    }
}

#[async_trait]
impl RenderingEngine for FakeEngine {
    type Browser = FakeBrowser;
    type Page = FakePage;

    async fn launch(&self, _settings: &LaunchSettings) -> Result<FakeBrowser> {
        let mut state = self.state.lock().unwrap();
        state.launch_attempts += 1;
        if state.failing_launches > 0 {
            state.failing_launches -= 1;
            return Err(AppError::BrowserLaunchFailed("chrome not found".to_string()));
        }
        state.launches += 1;
        Ok(FakeBrowser { id: state.launches })
    }

    async fn is_connected(&self, browser: &FakeBrowser) -> bool {
        !self.state.lock().unwrap().disconnected.contains(&browser.id)
    }

    async fn close_browser(&self, browser: FakeBrowser) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.browsers_closed.push(browser.id);
        if state.fail_browser_close {
            return Err(AppError::Browser("process already gone".to_string()));
        }
        Ok(())
    }

    async fn open_page(&self, browser: &FakeBrowser, _identity: &ClientIdentity) -> Result<FakePage> {
        let mut state = self.state.lock().unwrap();
        if state.disconnected.contains(&browser.id) {
            return Err(AppError::BrowserDisconnected("connection is closed".to_string()));
        }
        state.pages_opened += 1;
        Ok(FakePage {
            browser_id: browser.id,
            url: Mutex::new(None),
        })
    }

    async fn navigate(&self, page: &FakePage, url: &str, timeout: Duration) -> Result<()> {
        *page.url.lock().unwrap() = Some(url.to_string());
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());

        let navigation = state
            .scripts
            .get(url)
            .map(|script| script.navigation)
            .unwrap_or(Navigation::TimesOut);

        match navigation {
            Navigation::Loads => Ok(()),
            Navigation::TimesOut => Err(AppError::NavigationTimeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
            Navigation::Disconnects => {
                state.disconnected.insert(page.browser_id);
                Err(AppError::BrowserDisconnected("connection is closed".to_string()))
            }
        }
    }

    async fn wait_for_selector(&self, page: &FakePage, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(self.script_for(page).is_some_and(|script| script.marker_present))
    }

    async fn content(&self, page: &FakePage) -> Result<String> {
        Ok(self.script_for(page).map(|script| script.html).unwrap_or_default())
    }

    async fn current_url(&self, page: &FakePage) -> Result<String> {
        let requested = page.url.lock().unwrap().clone().unwrap_or_default();
        Ok(self
            .script_for(page)
            .and_then(|script| script.final_url)
            .unwrap_or(requested))
    }

    async fn close_page(&self, _page: FakePage) -> Result<()> {
        self.state.lock().unwrap().pages_closed += 1;
        Ok(())
    }
}
