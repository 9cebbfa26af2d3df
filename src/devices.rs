use serde::{Deserialize, Serialize};

/// Physical frame styling of a device screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayStyle {
    HomeButton,
    Notch,
    DynamicIsland,
}

/// Display characteristics for one product identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDisplayInfo {
    pub name: &'static str,
    pub screen_width: u32,
    pub screen_height: u32,
    pub display_style: DisplayStyle,
    pub corner_radius: u32,
}

impl DeviceDisplayInfo {
    const fn new(
        name: &'static str,
        screen_width: u32,
        screen_height: u32,
        display_style: DisplayStyle,
        corner_radius: u32,
    ) -> Self {
        Self {
            name,
            screen_width,
            screen_height,
            display_style,
            corner_radius,
        }
    }
}

/// Look up display characteristics for a product identifier such as
/// `iPhone15,2`.
///
/// Total: unknown identifiers fall back to a current-generation iPhone
/// entry, `iPad*` identifiers to a plain iPad entry.
pub fn display_info(model: &str) -> DeviceDisplayInfo {
    use DisplayStyle::*;

    match model {
        "iPhone10,3" | "iPhone10,6" => {
            DeviceDisplayInfo::new("iPhone X", 1125, 2436, Notch, 39)
        }
        "iPhone12,8" | "iPhone14,6" => {
            DeviceDisplayInfo::new("iPhone SE", 750, 1334, HomeButton, 0)
        }
        "iPhone13,1" => DeviceDisplayInfo::new("iPhone 12 mini", 1080, 2340, Notch, 44),
        "iPhone13,2" | "iPhone13,3" => {
            DeviceDisplayInfo::new("iPhone 12", 1170, 2532, Notch, 47)
        }
        "iPhone13,4" => DeviceDisplayInfo::new("iPhone 12 Pro Max", 1284, 2778, Notch, 53),
        "iPhone14,4" => DeviceDisplayInfo::new("iPhone 13 mini", 1080, 2340, Notch, 44),
        "iPhone14,5" | "iPhone14,2" => {
            DeviceDisplayInfo::new("iPhone 13", 1170, 2532, Notch, 47)
        }
        "iPhone14,3" => DeviceDisplayInfo::new("iPhone 13 Pro Max", 1284, 2778, Notch, 53),
        "iPhone14,7" => DeviceDisplayInfo::new("iPhone 14", 1170, 2532, Notch, 47),
        "iPhone14,8" => DeviceDisplayInfo::new("iPhone 14 Plus", 1284, 2778, Notch, 53),
        "iPhone15,2" => {
            DeviceDisplayInfo::new("iPhone 14 Pro", 1179, 2556, DynamicIsland, 55)
        }
        "iPhone15,3" => {
            DeviceDisplayInfo::new("iPhone 14 Pro Max", 1290, 2796, DynamicIsland, 55)
        }
        "iPhone15,4" => DeviceDisplayInfo::new("iPhone 15", 1179, 2556, DynamicIsland, 55),
        "iPhone15,5" => {
            DeviceDisplayInfo::new("iPhone 15 Plus", 1290, 2796, DynamicIsland, 55)
        }
        "iPhone16,1" => {
            DeviceDisplayInfo::new("iPhone 15 Pro", 1179, 2556, DynamicIsland, 55)
        }
        "iPhone16,2" => {
            DeviceDisplayInfo::new("iPhone 15 Pro Max", 1290, 2796, DynamicIsland, 55)
        }
        "iPhone17,1" => {
            DeviceDisplayInfo::new("iPhone 16 Pro", 1206, 2622, DynamicIsland, 62)
        }
        "iPhone17,2" => {
            DeviceDisplayInfo::new("iPhone 16 Pro Max", 1320, 2868, DynamicIsland, 62)
        }
        "iPhone17,3" => DeviceDisplayInfo::new("iPhone 16", 1179, 2556, DynamicIsland, 55),
        "iPad7,11" | "iPad7,12" => {
            DeviceDisplayInfo::new("iPad (7th generation)", 1620, 2160, HomeButton, 0)
        }
        "iPad12,1" | "iPad12,2" => {
            DeviceDisplayInfo::new("iPad (9th generation)", 1620, 2160, HomeButton, 0)
        }
        "iPad13,18" | "iPad13,19" => {
            DeviceDisplayInfo::new("iPad (10th generation)", 1640, 2360, HomeButton, 18)
        }
        _ if model.starts_with("iPad") => {
            DeviceDisplayInfo::new("iPad", 1620, 2160, HomeButton, 18)
        }
        _ => DeviceDisplayInfo::new("iPhone", 1179, 2556, DynamicIsland, 55),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_identifiers() {
        let info = display_info("iPhone15,2");
        assert_eq!(info.name, "iPhone 14 Pro");
        assert_eq!(info.screen_width, 1179);
        assert_eq!(info.screen_height, 2556);
        assert_eq!(info.display_style, DisplayStyle::DynamicIsland);
        assert_eq!(info.corner_radius, 55);

        let se = display_info("iPhone14,6");
        assert_eq!(se.display_style, DisplayStyle::HomeButton);
        assert_eq!(se.corner_radius, 0);
    }

    #[test]
    fn test_unknown_iphone_defaults_to_dynamic_island() {
        let info = display_info("iPhone99,9");
        assert_eq!(info.name, "iPhone");
        assert_eq!(info.screen_width, 1179);
        assert_eq!(info.screen_height, 2556);
        assert_eq!(info.display_style, DisplayStyle::DynamicIsland);
        assert_eq!(info.corner_radius, 55);
    }

    #[test]
    fn test_unknown_ipad_defaults_to_home_button() {
        let info = display_info("iPad99,1");
        assert_eq!(info.name, "iPad");
        assert_eq!(info.screen_width, 1620);
        assert_eq!(info.screen_height, 2160);
        assert_eq!(info.display_style, DisplayStyle::HomeButton);
    }

    #[test]
    fn test_lookup_is_total() {
        // Non-Apple identifiers share the iPhone default
        let info = display_info("Watch6,1");
        assert_eq!(info.name, "iPhone");
        let empty = display_info("");
        assert_eq!(empty.name, "iPhone");
    }

    #[test]
    fn test_dimensions_are_positive() {
        for model in ["iPhone10,3", "iPhone15,2", "iPad13,18", "unknown"] {
            let info = display_info(model);
            assert!(info.screen_width > 0);
            assert!(info.screen_height > 0);
            assert!(info.screen_height > info.screen_width);
        }
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(display_info("iPhone99,9")).unwrap();
        assert_eq!(json["name"], "iPhone");
        assert_eq!(json["screenWidth"], 1179);
        assert_eq!(json["screenHeight"], 2556);
        assert_eq!(json["displayStyle"], "dynamicIsland");
        assert_eq!(json["cornerRadius"], 55);
    }
}
