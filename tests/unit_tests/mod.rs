mod assembly;
mod mesh;
