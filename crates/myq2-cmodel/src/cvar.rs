// cvar.rs - console variables backing the collision model settings

use std::collections::HashMap;

pub const CVAR_ARCHIVE: i32 = 1;
/// Cannot be changed by the user once created.
pub const CVAR_NOSET: i32 = 8;
/// Development-only switch; logged when changed.
pub const CVAR_CHEAT: i32 = 64;

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

impl Cvar {
    fn new(name: &str, value: &str, flags: i32) -> Self {
        Self {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            modified: true,
            value: value.parse::<f32>().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> &Cvar {
        let idx = match self.cvar_index.get(name) {
            Some(&idx) => {
                self.cvar_vars[idx].flags |= flags;
                idx
            }
            None => {
                let idx = self.cvar_vars.len();
                self.cvar_vars.push(Cvar::new(name, value, flags));
                self.cvar_index.insert(name.to_string(), idx);
                idx
            }
        };
        &self.cvar_vars[idx]
    }

    /// Set a cvar, creating it if needed. Write-protected cvars are left
    /// alone unless `force` is set. Returns true when the value changed.
    pub fn set(&mut self, name: &str, value: &str, force: bool) -> bool {
        let Some(&idx) = self.cvar_index.get(name) else {
            self.get(name, value, 0);
            return true;
        };

        let var = &mut self.cvar_vars[idx];
        if !force && var.flags & CVAR_NOSET != 0 {
            log::warn!("{} is write protected.", name);
            return false;
        }
        if var.string == value {
            return false;
        }
        if var.flags & CVAR_CHEAT != 0 {
            log::info!("cheat cvar {} set to {}", name, value);
        }

        var.string = value.to_string();
        var.value = value.parse::<f32>().unwrap_or(0.0);
        var.modified = true;
        true
    }

    /// Returns and clears the modified flag.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.cvar_index.get(name) {
            Some(&idx) => std::mem::replace(&mut self.cvar_vars[idx].modified, false),
            None => false,
        }
    }
}
