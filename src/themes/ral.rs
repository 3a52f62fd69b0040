use egui::Color32;

/// The RAL classic colors the explorer paints with, as `(code, name, color)`.
pub const RAL_COLORS: &[(u16, &str, Color32)] = &[
    (1003, "Signal yellow", Color32::from_rgb(0xF9, 0xA8, 0x00)),
    (2005, "Luminous orange", Color32::from_rgb(0xFF, 0x4D, 0x06)),
    (2009, "Traffic orange", Color32::from_rgb(0xE2, 0x53, 0x03)),
    (2010, "Signal orange", Color32::from_rgb(0xD4, 0x65, 0x2F)),
    (3014, "Antique pink", Color32::from_rgb(0xCB, 0x73, 0x75)),
    (3020, "Traffic red", Color32::from_rgb(0xBB, 0x1E, 0x10)),
    (4008, "Signal violet", Color32::from_rgb(0x84, 0x4C, 0x82)),
    (5005, "Signal blue", Color32::from_rgb(0x15, 0x48, 0x89)),
    (5015, "Sky blue", Color32::from_rgb(0x00, 0x7C, 0xB0)),
    (5021, "Water blue", Color32::from_rgb(0x07, 0x73, 0x7A)),
    (6018, "Yellow green", Color32::from_rgb(0x57, 0xA6, 0x39)),
    (6027, "Light green", Color32::from_rgb(0x81, 0xC0, 0xBB)),
    (6032, "Signal green", Color32::from_rgb(0x23, 0x7F, 0x52)),
    (6033, "Mint turquoise", Color32::from_rgb(0x46, 0x87, 0x7F)),
    (7046, "Telegrey 2", Color32::from_rgb(0x82, 0x89, 0x8E)),
    (7047, "Telegrey 4", Color32::from_rgb(0xD0, 0xD0, 0xD0)),
    (9003, "Signal white", Color32::from_rgb(0xEC, 0xEC, 0xE7)),
    (9004, "Signal black", Color32::from_rgb(0x2B, 0x2B, 0x2C)),
    (9011, "Graphite black", Color32::from_rgb(0x27, 0x29, 0x2B)),
];
