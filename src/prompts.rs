//! Stage prompt templates
//!
//! The wording here is a contract with the model: file layout, manifest
//! fields and the texture alias path must stay in step with [`crate::bundle`].

use serde_json::{json, Value};

use crate::addon::GroundedContext;
use crate::request::Request;
use crate::sizing::TextureSize;

/// Texture path that generated files must reference, without extension.
pub const ITEM_TEXTURE_ALIAS_PATH: &str = "textures/items/custom_item";

/// Curated starter ideas offered to new users: (title, request text).
pub const STARTER_IDEAS: &[(&str, &str)] = &[
    ("Emerald Sword", "An emerald sword that deals 8 damage and has a durability of 2000."),
    ("Obsidian Apple", "An apple made of obsidian that grants fire resistance and slowness for 2 minutes."),
    ("Swift Boots", "Leather boots that increase the player's speed by 20% while worn."),
    ("Lapis Pickaxe", "A lapis lazuli pickaxe as fast as iron that enchants more easily."),
    ("Frost Bow", "A bow whose arrows apply Slowness IV for 5 seconds to any enemy hit."),
    ("Glowing Honey Loaf", "A honey bread that restores 8 hunger and gives Glowing for 1 minute when eaten."),
    ("Guardian Helmet", "A prismarine helmet that lets the player breathe underwater indefinitely."),
    ("Teleport Amulet", "A rare amulet that teleports the player 16 blocks forward when used, with 10 uses."),
];

pub fn grounding_prompt(request: &Request) -> String {
    format!(
        "For a game add-on idea: \"{}\", gather the key information and concepts. \
         What are its essential characteristics, appearance and typical abilities? \
         Provide a concise summary.",
        request.text
    )
}

pub fn content_prompt(request: &Request, context: &GroundedContext) -> String {
    let version = request.version_tag();
    let engine = request.engine_version_array();
    format!(
        r#"You are an expert Bedrock Edition add-on developer. Generate every file needed for one custom item based on the user's request, following the technical requirements strictly so the add-on works in game.

User request: "{request}"
Web research summary: "{summary}"
Platform version: "{version}"

Respond with a single JSON object with these fields:
- "name": a short, catchy add-on name.
- "description": a one-sentence description.
- "textureSize": the most appropriate square texture size in pixels. Simple items use 16 or 32; complex items may use 64 or 128, never more than 128.
- "files": an array of {{"path", "content"}} entries, one per file, with full archive paths (e.g. "behavior_pack/items/emerald_sword.json") and the file content as a string. Paths must be unique.
- "evaluation": an assessment of the files with the fields "complexity", "quality", "innovation", "common" and "summary".

Manifests:
- One manifest.json for the behavior pack and one for the resource pack, both with "format_version": 2.
- header.name is "[BP] <name>" and "[RP] <name>" respectively; header.description is the description; header.version is [1, 0, 0].
- header.min_engine_version is exactly {engine:?}.
- Use four distinct v4 UUIDs: one per header.uuid and one per modules[0].uuid.
- Each manifest lists the other pack as a dependency using the other pack's header UUID.

Item definition (behavior pack):
- Put the item JSON under behavior_pack/items/ with a relevant file name.
- Its "format_version" is "{version}".
- The namespaced identifier (e.g. custom:emerald_sword) is used consistently across all files.
- The minecraft:icon component uses a simple texture alias (e.g. "texture": "emerald_sword").

Textures (resource pack):
- Create resource_pack/textures/item_texture.json mapping the alias to exactly "{alias}" (no .png extension).
- Do not create render_controllers.

Localization (resource pack):
- resource_pack/texts/en_US.lang with the item name entry (e.g. item.custom:emerald_sword.name=Emerald Sword).
- resource_pack/texts/pt_BR.lang with the same entry translated to Portuguese."#,
        request = request.text,
        summary = context.summary,
        version = version,
        engine = engine,
        alias = ITEM_TEXTURE_ALIAS_PATH,
    )
}

/// Response schema for [`content_prompt`].
pub fn content_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "description": { "type": "STRING" },
            "textureSize": { "type": "NUMBER" },
            "files": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "path": { "type": "STRING" },
                        "content": { "type": "STRING" }
                    },
                    "required": ["path", "content"]
                }
            },
            "evaluation": {
                "type": "OBJECT",
                "properties": {
                    "complexity": { "type": "STRING" },
                    "quality": { "type": "STRING" },
                    "innovation": { "type": "STRING" },
                    "common": { "type": "STRING" },
                    "summary": { "type": "STRING" }
                },
                "required": ["complexity", "quality", "innovation", "common", "summary"]
            }
        },
        "required": ["name", "description", "textureSize", "files", "evaluation"]
    })
}

pub fn image_prompt(request: &Request, size: TextureSize) -> String {
    format!(
        "Create a single, square, {size}x{size} pixel art texture for a game item based on this description: \"{}\".\n\
         Style rules:\n\
         - The artwork should look like it belongs in a blocky voxel game.\n\
         - The item must be centered.\n\
         - The background MUST be transparent.",
        request.text,
        size = size,
    )
}

pub fn critique_prompt(request: &Request, size: TextureSize) -> String {
    format!(
        "Please analyze this {size}x{size} pixel art image intended for a game add-on based on the description: \"{}\". \
         Evaluate its quality, clarity and adherence to the game's art style. Provide a short, constructive critique.",
        request.text,
        size = size,
    )
}
